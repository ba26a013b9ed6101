//! # Store — Persistent Storage Engine
//!
//! The durable, single-node local store, built on sled's embedded
//! key-value store, one named tree per table: `open`/`open_temporary`
//! constructors, bincode-per-tree encoding, every sled error wrapped
//! behind a typed `DbError`.
//!
//! The one subtlety: sled's `Tree::insert` always overwrites, but
//! `messages` and `gossip_cache` need insert-or-ignore semantics so that
//! replaying the same row is a no-op. There's no native sled primitive
//! for that, so both are implemented as a `compare_and_swap`-free
//! check-then-insert under the writer mutex — safe because writes are
//! already serialized through a single-writer discipline, so there's no
//! TOCTOU window for another writer to land in between.

use super::models::{Channel, ChannelMembership, GossipCacheEntry, Message, Peer};
use crate::identity::node_id::NodeId;
use parking_lot::Mutex;
use sled::{Db, Tree};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Result of an idempotent insert: whether the row was newly written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Persistent storage engine for a TAD node.
///
/// All writes go through `write_lock` — a process-local mutex enforcing
/// a single-writer discipline. sled itself is thread-safe for concurrent
/// reads, so nothing guards the getters.
pub struct Store {
    db: Db,
    messages: Tree,
    channels: Tree,
    channel_members: Tree,
    peers: Tree,
    gossip_cache: Tree,
    config: Tree,
    seen_invites: Tree,
    write_lock: Mutex<()>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// An in-memory database that disappears when dropped. Used by tests
    /// and by the orchestrator's dry-run / `status` CLI paths.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            messages: db.open_tree("messages")?,
            channels: db.open_tree("channels")?,
            channel_members: db.open_tree("channel_members")?,
            peers: db.open_tree("peers")?,
            gossip_cache: db.open_tree("gossip_cache")?,
            config: db.open_tree("config")?,
            seen_invites: db.open_tree("seen_invites")?,
            db,
            write_lock: Mutex::new(()),
        })
    }

    // -- messages -------------------------------------------------------

    /// Insert a message if `id` hasn't been seen before. No-op (but not an
    /// error) if it has — this is what makes gossip replay safe.
    pub fn insert_message(&self, message: &Message) -> DbResult<InsertOutcome> {
        let _guard = self.write_lock.lock();
        if self.messages.contains_key(message.id.as_bytes())? {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        let bytes = bincode::serialize(message).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.messages.insert(message.id.as_bytes(), bytes)?;
        Ok(InsertOutcome::Inserted)
    }

    pub fn get_message(&self, id: &str) -> DbResult<Option<Message>> {
        match self.messages.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Case-insensitive substring search over `content`. Read-only;
    /// a full scan is fine at the scale a single LAN node's message log
    /// reaches.
    pub fn search_messages(&self, needle: &str) -> DbResult<Vec<Message>> {
        let needle_lower = needle.to_lowercase();
        let mut matches = Vec::new();
        for entry in self.messages.iter() {
            let (_key, bytes) = entry?;
            let message: Message =
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
            if message.content.to_lowercase().contains(&needle_lower) {
                matches.push(message);
            }
        }
        Ok(matches)
    }

    /// Delete every message belonging to `channel`. Used by channel
    /// deletion cascade.
    pub fn delete_messages_for_channel(&self, channel: &str) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        let mut to_remove = Vec::new();
        for entry in self.messages.iter() {
            let (key, bytes) = entry?;
            let message: Message =
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
            if message.channel == channel {
                to_remove.push(key);
            }
        }
        for key in to_remove {
            self.messages.remove(key)?;
        }
        Ok(())
    }

    /// Messages in `channel` with `timestamp` strictly greater than
    /// `since`, ordered oldest-first. Answers a `SyncRequestEnvelope` when
    /// a peer rejoins the LAN after being offline.
    pub fn messages_for_channel_since(&self, channel: &str, since: f64) -> DbResult<Vec<Message>> {
        let mut matches = Vec::new();
        for entry in self.messages.iter() {
            let (_key, bytes) = entry?;
            let message: Message =
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
            if message.channel == channel && message.timestamp > since {
                matches.push(message);
            }
        }
        matches.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal));
        Ok(matches)
    }

    // -- channels ---------------------------------------------------------

    pub fn put_channel(&self, channel: &Channel) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        let bytes = bincode::serialize(channel).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.channels.insert(channel.name.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_channel(&self, name: &str) -> DbResult<Option<Channel>> {
        match self.channels.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn list_channels(&self) -> DbResult<Vec<Channel>> {
        let mut channels = Vec::new();
        for entry in self.channels.iter() {
            let (_key, bytes) = entry?;
            channels
                .push(bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?);
        }
        Ok(channels)
    }

    /// Delete a channel and cascade to its messages and memberships.
    pub fn delete_channel(&self, name: &str) -> DbResult<()> {
        {
            let _guard = self.write_lock.lock();
            self.channels.remove(name.as_bytes())?;
            let mut member_keys = Vec::new();
            for entry in self.channel_members.iter() {
                let (key, _value) = entry?;
                if key.starts_with(format!("{name}\0").as_bytes()) {
                    member_keys.push(key);
                }
            }
            for key in member_keys {
                self.channel_members.remove(key)?;
            }
        }
        self.delete_messages_for_channel(name)
    }

    // -- channel_members ----------------------------------------------------

    fn membership_key(channel: &str, peer_id: &NodeId) -> Vec<u8> {
        let mut key = channel.as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(peer_id.to_text().as_bytes());
        key
    }

    pub fn put_membership(&self, membership: &ChannelMembership) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        let key = Self::membership_key(&membership.channel, &membership.peer_id);
        let bytes =
            bincode::serialize(membership).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.channel_members.insert(key, bytes)?;
        Ok(())
    }

    pub fn get_membership(
        &self,
        channel: &str,
        peer_id: &NodeId,
    ) -> DbResult<Option<ChannelMembership>> {
        let key = Self::membership_key(channel, peer_id);
        match self.channel_members.get(key)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn list_members(&self, channel: &str) -> DbResult<Vec<ChannelMembership>> {
        let prefix = format!("{channel}\0");
        let mut members = Vec::new();
        for entry in self.channel_members.scan_prefix(prefix.as_bytes()) {
            let (_key, bytes) = entry?;
            members
                .push(bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?);
        }
        Ok(members)
    }

    pub fn is_member(&self, channel: &str, peer_id: &NodeId) -> DbResult<bool> {
        Ok(self.get_membership(channel, peer_id)?.is_some())
    }

    // -- peers --------------------------------------------------------------

    pub fn put_peer(&self, peer: &Peer) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        let bytes = bincode::serialize(peer).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.peers.insert(peer.node_id.to_text().as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_peer(&self, node_id: &NodeId) -> DbResult<Option<Peer>> {
        match self.peers.get(node_id.to_text().as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn list_peers(&self) -> DbResult<Vec<Peer>> {
        let mut peers = Vec::new();
        for entry in self.peers.iter() {
            let (_key, bytes) = entry?;
            peers.push(bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?);
        }
        Ok(peers)
    }

    // -- gossip_cache ---------------------------------------------------------

    /// Record `message_id` as seen, unless it already is. Survives
    /// restarts, so a message re-delivered after a crash or reboot is
    /// still recognized as a duplicate.
    pub fn insert_gossip_cache_entry(
        &self,
        message_id: &str,
        entry: GossipCacheEntry,
    ) -> DbResult<InsertOutcome> {
        let _guard = self.write_lock.lock();
        if self.gossip_cache.contains_key(message_id.as_bytes())? {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        let bytes = bincode::serialize(&entry).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.gossip_cache.insert(message_id.as_bytes(), bytes)?;
        Ok(InsertOutcome::Inserted)
    }

    pub fn gossip_cache_contains(&self, message_id: &str) -> DbResult<bool> {
        Ok(self.gossip_cache.contains_key(message_id.as_bytes())?)
    }

    pub fn gossip_cache_len(&self) -> usize {
        self.gossip_cache.len()
    }

    /// Prune entries whose `first_seen_at` is older than `now - max_age_secs`.
    /// Called periodically by the orchestrator's maintenance task.
    pub fn prune_gossip_cache(&self, now: i64, max_age_secs: i64) -> DbResult<usize> {
        let _guard = self.write_lock.lock();
        let mut stale = Vec::new();
        for entry in self.gossip_cache.iter() {
            let (key, bytes) = entry?;
            let cache_entry: GossipCacheEntry =
                bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
            if now - cache_entry.first_seen_at > max_age_secs {
                stale.push(key);
            }
        }
        let pruned = stale.len();
        for key in stale {
            self.gossip_cache.remove(key)?;
        }
        Ok(pruned)
    }

    // -- config ---------------------------------------------------------------

    pub fn set_config(&self, key: &str, value: &str) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        self.config.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> DbResult<Option<String>> {
        match self.config.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes.to_vec()).map_err(|e| DbError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    // -- seen_invites -----------------------------------------------------

    /// Replay guard for invites, keyed by `(issuer_id, channel_name, issued_at)`.
    pub fn mark_invite_seen(&self, issuer_id: &NodeId, channel: &str, issued_at: i64) -> DbResult<InsertOutcome> {
        let _guard = self.write_lock.lock();
        let key = format!("{}\0{}\0{}", issuer_id.to_text(), channel, issued_at);
        if self.seen_invites.contains_key(key.as_bytes())? {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.seen_invites.insert(key.as_bytes(), &[])?;
        Ok(InsertOutcome::Inserted)
    }

    // -- maintenance ------------------------------------------------------

    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
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

    fn test_message(id: &str, channel: &str) -> Message {
        Message {
            id: id.to_string(),
            timestamp: 1000.0,
            sender_id: test_node_id(),
            sender_name: Some("alice".into()),
            channel: channel.to_string(),
            content: "hello world".into(),
            encrypted: false,
            nonce: None,
            signature: "deadbeef".into(),
            ttl: 5,
            hop_count: 0,
        }
    }

    #[test]
    fn open_temporary_store_is_empty() {
        let store = Store::open_temporary().unwrap();
        assert_eq!(store.message_count(), 0);
        assert_eq!(store.gossip_cache_len(), 0);
    }

    #[test]
    fn open_persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.insert_message(&test_message("m1", "#general")).unwrap();
        drop(store);

        let reopened = Store::open(dir.path()).unwrap();
        assert!(reopened.get_message("m1").unwrap().is_some());
    }

    #[test]
    fn insert_message_is_idempotent() {
        let store = Store::open_temporary().unwrap();
        let message = test_message("m1", "#general");

        let first = store.insert_message(&message).unwrap();
        let second = store.insert_message(&message).unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyPresent);
        assert_eq!(store.message_count(), 1);
    }

    #[test]
    fn search_messages_is_case_insensitive() {
        let store = Store::open_temporary().unwrap();
        store.insert_message(&test_message("m1", "#general")).unwrap();

        assert_eq!(store.search_messages("HELLO").unwrap().len(), 1);
        assert_eq!(store.search_messages("goodbye").unwrap().len(), 0);
    }

    #[test]
    fn messages_for_channel_since_excludes_earlier_and_other_channels() {
        let store = Store::open_temporary().unwrap();
        let mut old = test_message("old", "#general");
        old.timestamp = 1000.0;
        let mut fresh = test_message("fresh", "#general");
        fresh.timestamp = 2000.0;
        let mut other_channel = test_message("other", "#random");
        other_channel.timestamp = 3000.0;
        store.insert_message(&old).unwrap();
        store.insert_message(&fresh).unwrap();
        store.insert_message(&other_channel).unwrap();

        let caught_up = store.messages_for_channel_since("#general", 1500.0).unwrap();

        assert_eq!(caught_up.len(), 1);
        assert_eq!(caught_up[0].id, "fresh");
    }

    #[test]
    fn delete_channel_cascades_to_messages_and_members() {
        let store = Store::open_temporary().unwrap();
        let channel = Channel::new_public("#general".into(), 1000);
        store.put_channel(&channel).unwrap();
        store.insert_message(&test_message("m1", "#general")).unwrap();
        let peer_id = test_node_id();
        store
            .put_membership(&ChannelMembership::new("#general".into(), peer_id.clone(), 1000))
            .unwrap();

        store.delete_channel("#general").unwrap();

        assert!(store.get_channel("#general").unwrap().is_none());
        assert!(store.get_message("m1").unwrap().is_none());
        assert!(!store.is_member("#general", &peer_id).unwrap());
    }

    #[test]
    fn gossip_cache_insert_is_idempotent() {
        let store = Store::open_temporary().unwrap();
        let entry = GossipCacheEntry {
            first_seen_at: 1000,
            remaining_ttl: 5,
        };
        let first = store.insert_gossip_cache_entry("m1", entry).unwrap();
        let second = store.insert_gossip_cache_entry("m1", entry).unwrap();
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyPresent);
    }

    #[test]
    fn gossip_cache_prune_removes_stale_entries() {
        let store = Store::open_temporary().unwrap();
        store
            .insert_gossip_cache_entry(
                "old",
                GossipCacheEntry {
                    first_seen_at: 0,
                    remaining_ttl: 5,
                },
            )
            .unwrap();
        store
            .insert_gossip_cache_entry(
                "fresh",
                GossipCacheEntry {
                    first_seen_at: 3_600,
                    remaining_ttl: 5,
                },
            )
            .unwrap();

        let pruned = store.prune_gossip_cache(3_600, 3_600).unwrap();

        assert_eq!(pruned, 1);
        assert!(!store.gossip_cache_contains("old").unwrap());
        assert!(store.gossip_cache_contains("fresh").unwrap());
    }

    #[test]
    fn membership_roundtrip() {
        let store = Store::open_temporary().unwrap();
        let peer_id = test_node_id();
        let membership = ChannelMembership::new("#team".into(), peer_id.clone(), 1000);
        store.put_membership(&membership).unwrap();

        assert!(store.is_member("#team", &peer_id).unwrap());
        assert_eq!(store.list_members("#team").unwrap().len(), 1);
    }

    #[test]
    fn config_roundtrip() {
        let store = Store::open_temporary().unwrap();
        store.set_config("display_name", "alice").unwrap();
        assert_eq!(
            store.get_config("display_name").unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(store.get_config("missing").unwrap(), None);
    }

    #[test]
    fn invite_replay_guard_rejects_repeat() {
        let store = Store::open_temporary().unwrap();
        let issuer = test_node_id();
        let first = store.mark_invite_seen(&issuer, "#team", 1000).unwrap();
        let second = store.mark_invite_seen(&issuer, "#team", 1000).unwrap();
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyPresent);
    }

    #[test]
    fn concurrent_reads_and_writes_do_not_corrupt_store() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(Store::open_temporary().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let message = test_message(&format!("m{i}"), "#general");
                    store.insert_message(&message).unwrap();
                    store.get_message(&format!("m{i}")).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_some());
        }
        assert_eq!(store.message_count(), 8);
    }
}
