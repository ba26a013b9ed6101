//! # Persisted Record Types
//!
//! Plain serde structs for everything the store keeps durably:
//! [`Peer`], [`Channel`], [`ChannelMembership`], [`Message`], and
//! [`GossipCacheEntry`]. Each carries a handful of inherent constructors
//! and nothing resembling a builder pattern — the fields are few enough,
//! and their invariants tight enough, that a builder would just add
//! indirection.

use crate::identity::node_id::NodeId;
use serde::{Deserialize, Serialize};

/// Connection status of an observed peer, as tracked by the connection
/// fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Online,
    Offline,
    Unknown,
}

/// An observed remote node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub node_id: NodeId,
    pub address: String,
    pub signing_public_key: String,
    pub encryption_public_key: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub status: PeerStatus,
    pub blocked: bool,
}

impl Peer {
    pub fn new_observed(
        node_id: NodeId,
        address: String,
        signing_public_key: String,
        encryption_public_key: String,
        observed_at: i64,
    ) -> Self {
        Self {
            node_id,
            address,
            signing_public_key,
            encryption_public_key,
            first_seen: observed_at,
            last_seen: observed_at,
            status: PeerStatus::Unknown,
            blocked: false,
        }
    }

    pub fn mark_seen(&mut self, at: i64, status: PeerStatus) {
        self.last_seen = at;
        self.status = status;
    }
}

/// A named routing + membership group.
///
/// `private_key` holds the raw 32-byte symmetric key only while decrypted
/// in memory; the persisted row always carries it wrapped under the
/// node's own storage, never plaintext on disk (see `persistence::db`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub encrypted: bool,
    pub password_hash: Option<String>,
    pub salt: Option<String>,
    pub symmetric_key: Option<[u8; 32]>,
    pub created_at: i64,
    pub last_activity: i64,
    pub message_count: u64,
}

impl Channel {
    pub fn new_public(name: String, created_at: i64) -> Self {
        Self {
            name,
            encrypted: false,
            password_hash: None,
            salt: None,
            symmetric_key: None,
            created_at,
            last_activity: created_at,
            message_count: 0,
        }
    }

    pub fn new_private(name: String, symmetric_key: [u8; 32], created_at: i64) -> Self {
        Self {
            name,
            encrypted: true,
            password_hash: None,
            salt: None,
            symmetric_key: Some(symmetric_key),
            created_at,
            last_activity: created_at,
            message_count: 0,
        }
    }

    /// The password-derived legacy path: mutually exclusive with
    /// [`Channel::new_private`]'s invite-keyed model —
    /// `password_hash`/`salt` are set here and never alongside a channel
    /// whose key only ever arrived via a sealed invite.
    pub fn new_password_protected(
        name: String,
        symmetric_key: [u8; 32],
        password_hash: String,
        salt: String,
        created_at: i64,
    ) -> Self {
        Self {
            name,
            encrypted: true,
            password_hash: Some(password_hash),
            salt: Some(salt),
            symmetric_key: Some(symmetric_key),
            created_at,
            last_activity: created_at,
            message_count: 0,
        }
    }

    pub fn record_activity(&mut self, at: i64) {
        self.last_activity = at;
        self.message_count += 1;
    }
}

/// (channel, peer) subscription / access-control record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMembership {
    pub channel: String,
    pub peer_id: NodeId,
    pub joined_at: i64,
    pub last_read: i64,
}

impl ChannelMembership {
    pub fn new(channel: String, peer_id: NodeId, joined_at: i64) -> Self {
        Self {
            channel,
            peer_id,
            joined_at,
            last_read: joined_at,
        }
    }
}

/// The dissemination unit.
///
/// `signature` is computed over the canonical encoding of every field
/// except `signature`, `ttl`, and `hop_count` (see
/// [`crate::identity::canonical`]). `ttl`/`hop_count` are transport-only:
/// they travel with the `gossip` envelope but are never part of what gets
/// signed, persisted alongside the row only for crash-resume bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: f64,
    pub sender_id: NodeId,
    pub sender_name: Option<String>,
    pub channel: String,
    pub content: String,
    pub encrypted: bool,
    pub nonce: Option<String>,
    pub signature: String,
    #[serde(skip_serializing, default)]
    pub ttl: u8,
    #[serde(skip_serializing, default)]
    pub hop_count: u8,
}

impl Message {
    /// Fields eligible for canonical signing: every field except
    /// `signature`, `ttl`, `hop_count`.
    pub fn signable_fields(&self) -> SignableMessage<'_> {
        SignableMessage {
            id: &self.id,
            timestamp: self.timestamp,
            sender_id: &self.sender_id,
            sender_name: self.sender_name.as_deref(),
            channel: &self.channel,
            content: &self.content,
            encrypted: self.encrypted,
            nonce: self.nonce.as_deref(),
        }
    }
}

/// The exact shape signed and verified — deliberately separate from
/// [`Message`] so that adding a transport-only field later can never
/// silently change what gets signed.
#[derive(Debug, Serialize)]
pub struct SignableMessage<'a> {
    pub id: &'a str,
    pub timestamp: f64,
    pub sender_id: &'a NodeId,
    pub sender_name: Option<&'a str>,
    pub channel: &'a str,
    pub content: &'a str,
    pub encrypted: bool,
    pub nonce: Option<&'a str>,
}

/// Dedup bookkeeping row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GossipCacheEntry {
    pub first_seen_at: i64,
    pub remaining_ttl: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::SigningKeypair;

    fn test_node_id() -> NodeId {
        let kp = SigningKeypair::generate();
        NodeId::from_public_key(&kp.public_key())
    }

    #[test]
    fn peer_new_observed_sets_first_and_last_seen_equal() {
        let peer = Peer::new_observed(
            test_node_id(),
            "10.0.0.5:8765".into(),
            "pubkey".into(),
            "enc-pubkey".into(),
            1000,
        );
        assert_eq!(peer.first_seen, peer.last_seen);
        assert_eq!(peer.status, PeerStatus::Unknown);
        assert!(!peer.blocked);
    }

    #[test]
    fn peer_mark_seen_updates_last_seen_only() {
        let mut peer = Peer::new_observed(
            test_node_id(),
            "10.0.0.5:8765".into(),
            "pubkey".into(),
            "enc-pubkey".into(),
            1000,
        );
        peer.mark_seen(2000, PeerStatus::Online);
        assert_eq!(peer.first_seen, 1000);
        assert_eq!(peer.last_seen, 2000);
        assert_eq!(peer.status, PeerStatus::Online);
    }

    #[test]
    fn channel_new_public_has_no_key() {
        let channel = Channel::new_public("#general".into(), 1000);
        assert!(!channel.encrypted);
        assert!(channel.symmetric_key.is_none());
        assert_eq!(channel.message_count, 0);
    }

    #[test]
    fn channel_new_private_carries_key() {
        let channel = Channel::new_private("#secret".into(), [7u8; 32], 1000);
        assert!(channel.encrypted);
        assert_eq!(channel.symmetric_key, Some([7u8; 32]));
    }

    #[test]
    fn channel_record_activity_bumps_count_and_timestamp() {
        let mut channel = Channel::new_public("#general".into(), 1000);
        channel.record_activity(1050);
        channel.record_activity(1100);
        assert_eq!(channel.message_count, 2);
        assert_eq!(channel.last_activity, 1100);
    }

    #[test]
    fn channel_new_password_protected_carries_hash_and_salt() {
        let channel = Channel::new_password_protected(
            "#lounge".into(),
            [7u8; 32],
            "deadbeef".into(),
            "0123456789abcdef".into(),
            1000,
        );
        assert!(channel.encrypted);
        assert_eq!(channel.password_hash.as_deref(), Some("deadbeef"));
        assert_eq!(channel.salt.as_deref(), Some("0123456789abcdef"));
        assert_eq!(channel.symmetric_key, Some([7u8; 32]));
    }

    #[test]
    fn membership_new_sets_last_read_to_joined_at() {
        let membership = ChannelMembership::new("#general".into(), test_node_id(), 1000);
        assert_eq!(membership.joined_at, membership.last_read);
    }

    #[test]
    fn message_signable_fields_excludes_transport_fields() {
        let message = Message {
            id: "abc123".into(),
            timestamp: 1000.0,
            sender_id: test_node_id(),
            sender_name: Some("alice".into()),
            channel: "#general".into(),
            content: "hi".into(),
            encrypted: false,
            nonce: None,
            signature: "deadbeef".into(),
            ttl: 5,
            hop_count: 0,
        };
        let signable = message.signable_fields();
        let encoded = crate::identity::canonical::to_canonical_json(&signable).unwrap();
        assert!(!encoded.contains("ttl"));
        assert!(!encoded.contains("hop_count"));
        assert!(!encoded.contains("signature"));
    }
}
