//! # Persistence
//!
//! The durable, single-node local store: messages, channels, channel
//! memberships, peers, the gossip dedup cache, and scalar config, all
//! behind one [`Store`] handle backed by `sled`.

pub mod db;
pub mod models;

pub use db::{DbError, DbResult, InsertOutcome, Store};
pub use models::{Channel, ChannelMembership, GossipCacheEntry, Message, Peer, PeerStatus, SignableMessage};
