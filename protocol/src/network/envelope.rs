//! # Wire Envelope
//!
//! Every frame exchanged between two TAD nodes is one JSON object,
//! newline-terminated, tagged by its `type` field. This
//! module defines the closed set of envelope variants, the handshake
//! fields, and the closed set of protocol-level error codes.
//!
//! ## Handshake
//!
//! ```text
//! Dialer                              Listener
//! ───────                             ────────
//!   │  Hello { node_id, ... }           │
//!   │──────────────────────────────>    │
//!   │          Welcome { node_id, ... } │
//!   │<──────────────────────────────    │
//! ```
//!
//! Either side may close the connection instead of replying if the
//! protocol versions share no overlap — that closure carries
//! `ErrorCode::ProtocolVersionMismatch`.

use serde::{Deserialize, Serialize};

use crate::identity::node_id::NodeId;
use crate::persistence::models::{Channel, Message};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The closed set of frame types a TAD node will ever send or accept.
/// Anything else is a protocol violation (`ErrorCode::InvalidFormat`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Hello(Hello),
    Welcome(Welcome),
    Message(Message),
    Gossip(GossipEnvelope),
    CreateChannel(CreateChannel),
    JoinChannel(JoinChannel),
    LeaveChannel(LeaveChannel),
    Invite(Invite),
    PeerAnnounce(PeerAnnounce),
    PeerRequest(PeerRequest),
    PeerResponse(PeerResponse),
    SyncRequest(SyncRequestEnvelope),
    SyncResponse(SyncResponseEnvelope),
    Ping(Ping),
    Pong(Pong),
    Error(ErrorEnvelope),
}

impl Envelope {
    /// Serialize into a single newline-terminated JSON line, ready for
    /// [`crate::network::fabric`]'s framed writer.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one newline-stripped JSON line into an [`Envelope`].
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// First frame sent by the dialing side immediately after the TCP
/// connection is established.
///
/// Carries the dialer's long-lived public key material (hex-encoded), not
/// just its `node_id` — `node_id` is a one-way hash of the signing key, so
/// without this the listening side would have no way to verify anything
/// this peer signs or seal an invite to its encryption key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub node_id: NodeId,
    pub display_name: Option<String>,
    pub protocol_version: String,
    pub listen_port: u16,
    pub signing_public_key: String,
    pub encryption_public_key: String,
}

/// Reply from the listening side, completing the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Welcome {
    pub node_id: NodeId,
    pub display_name: Option<String>,
    pub protocol_version: String,
    pub signing_public_key: String,
    pub encryption_public_key: String,
}

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// A [`Message`] wrapped for propagation, carrying the transport-only
/// `ttl`/`hop_count` fields as siblings of the message body rather than
/// embedded in it (see [`crate::persistence::models::Message`]'s doc
/// comment for why those two never travel inside the signed payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipEnvelope {
    pub message: Message,
    pub ttl: u8,
    pub hop_count: u8,
}

// ---------------------------------------------------------------------------
// Channel Management
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannel {
    pub name: String,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinChannel {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveChannel {
    pub channel: String,
}

/// A sealed channel invite, addressed to a specific recipient by
/// `node_id`. `sealed_key` is the X25519 sealed box wrapping the
/// channel's symmetric key; only the named recipient's encryption key
/// can open it. Carries no signature of its own — it travels as the
/// `content` of a signed gossip [`Message`], so the outer message
/// signature is what authenticates the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub channel: String,
    pub recipient: NodeId,
    pub ephemeral_public_key: String,
    pub nonce: String,
    pub sealed_key: String,
    pub issued_at: i64,
}

// ---------------------------------------------------------------------------
// Peer Exchange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAnnounce {
    pub node_id: NodeId,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerResponse {
    pub peers: Vec<PeerAnnounce>,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// "Catch me up on everything you have for this channel since `since`."
/// Used when a node rejoins the LAN after being offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequestEnvelope {
    pub channel: String,
    pub since: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponseEnvelope {
    pub channel: String,
    pub messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub sent_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pong {
    pub sent_at: i64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The closed set of protocol-level error codes. These
/// travel on the wire, distinct from [`crate::network::fabric::FabricError`]
/// which never leaves the local process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidFormat,
    InvalidSignature,
    UnknownSender,
    ChannelNotFound,
    PermissionDenied,
    RateLimited,
    MessageTooLarge,
    ProtocolVersionMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub detail: String,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
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
    fn hello_roundtrips_through_frame() {
        let hello = Envelope::Hello(Hello {
            node_id: test_node_id(),
            display_name: Some("alice".into()),
            protocol_version: "1.0.0".into(),
            listen_port: 8765,
            signing_public_key: "deadbeef".into(),
            encryption_public_key: "cafebabe".into(),
        });
        let frame = hello.to_frame().unwrap();
        assert!(frame.ends_with('\n'));
        let parsed = Envelope::from_line(&frame).unwrap();
        match parsed {
            Envelope::Hello(h) => assert_eq!(h.listen_port, 8765),
            other => panic!("expected Hello, got {:?}", other),
        }
    }

    #[test]
    fn tag_field_is_snake_case_type() {
        let ping = Envelope::Ping(Ping { sent_at: 1000 });
        let frame = ping.to_frame().unwrap();
        assert!(frame.contains("\"type\":\"ping\""));
    }

    #[test]
    fn error_code_serializes_screaming_snake_case() {
        let err = Envelope::Error(ErrorEnvelope::new(ErrorCode::RateLimited, "too fast"));
        let frame = err.to_frame().unwrap();
        assert!(frame.contains("\"RATE_LIMITED\""));
    }

    #[test]
    fn unknown_type_field_fails_to_parse() {
        let line = r#"{"type":"not_a_real_variant"}"#;
        assert!(Envelope::from_line(line).is_err());
    }

    #[test]
    fn gossip_envelope_carries_ttl_and_hop_count_as_siblings() {
        let kp = SigningKeypair::generate();
        let node_id = NodeId::from_public_key(&kp.public_key());
        let message = Message {
            id: "abc".into(),
            timestamp: 1000.0,
            sender_id: node_id,
            sender_name: None,
            channel: "#general".into(),
            content: "hi".into(),
            encrypted: false,
            nonce: None,
            signature: "sig".into(),
            ttl: 0,
            hop_count: 0,
        };
        let envelope = Envelope::Gossip(GossipEnvelope {
            message,
            ttl: 5,
            hop_count: 1,
        });
        let frame = envelope.to_frame().unwrap();
        assert!(frame.contains("\"ttl\":5"));
        assert!(frame.contains("\"hop_count\":1"));
    }
}
