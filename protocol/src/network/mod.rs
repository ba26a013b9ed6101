//! # Network Module
//!
//! P2P networking layer for TAD. Handles the connection fabric (framed
//! TCP sessions and handshakes), mDNS discovery on the local network,
//! the wire envelope format, and the gossip engine that decides what
//! to do with an inbound or outbound message.
//!
//! ## Architecture
//!
//! ```text
//! fabric.rs    — TCP listen/dial, handshake, framed Session I/O
//! discovery.rs — mDNS announce/browse for LAN peer discovery
//! envelope.rs  — newline-delimited JSON wire format
//! gossip.rs    — dedup, rate limiting, and fanout decisions (I/O-free)
//! ```
//!
//! ## Design Decisions
//!
//! - The gossip engine never touches sockets. It consumes a `Message`
//!   plus context and returns a `GossipAction` describing what the
//!   caller (`crate::orchestrator`) should do — forward, deliver, or
//!   drop. Keeping it I/O-free makes it straightforward to test without
//!   a network.
//! - Gossip deduplication uses a bounded seen-message cache keyed by
//!   message id, with TTL-based and size-based eviction.
//! - Envelope framing is newline-delimited JSON rather than a binary
//!   codec — this is a local-network chat protocol, not a
//!   high-throughput pipe, and plaintext framing is easy to debug.

pub mod discovery;
pub mod envelope;
pub mod fabric;
pub mod gossip;

pub use discovery::{Discovery, DiscoveredPeer, DiscoveryError, DiscoveryStream};
pub use envelope::{Envelope, ErrorCode, GossipEnvelope, Invite};
pub use fabric::{FabricError, Session};
pub use gossip::{
    ChannelContext, DropReason, GossipAction, GossipEngine, GossipError, RateLimitCategory,
    RateLimitVerdict, SenderInfo,
};
