//! # Gossip Engine
//!
//! Dissemination core. Deliberately I/O-free:
//! [`GossipEngine::receive`] and [`GossipEngine::broadcast`] return a
//! [`GossipAction`] describing what the caller (the orchestrator) should do
//! next — forward a frame to specific peers, deliver a message to the
//! application, or drop with a reason — rather than touching sockets or
//! mDNS themselves. That split is what makes the dedup/rate-limit/fanout
//! logic testable without a live network.
//!
//! Dedup state (the `seen` cache, rate-limit counters) lives in-process
//! behind `dashmap`, the same discipline the connection fabric uses for
//! its peer table. Durable dedup (surviving a restart) is the persistence
//! layer's `gossip_cache` table — this engine only holds the hot,
//! in-memory half and leans on [`crate::persistence::db::Store`] for the
//! rest.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{
    GOSSIP_CACHE_ENTRY_TTL, GOSSIP_CACHE_SIZE, GOSSIP_FANOUT, GOSSIP_MAX_CLOCK_SKEW_FORWARD,
    GOSSIP_MAX_MESSAGE_AGE, GOSSIP_TTL_DEFAULT, RATE_LIMIT_GOSSIP_FORWARDED_PER_SEC,
    RATE_LIMIT_MESSAGES_PER_SEC, RATE_LIMIT_PEER_REQUESTS_PER_MIN,
    RATE_LIMIT_SYNC_REQUESTS_PER_MIN, RATE_LIMIT_VIOLATIONS_BEFORE_CLOSE,
};
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::signatures::verify_canonical;
use crate::identity::keypair::{SignatureBytes, VerifyingKeyBytes};
use crate::identity::node_id::NodeId;
use crate::persistence::models::Message;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("invalid signature encoding: {0}")]
    MalformedSignature(String),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

/// Why a frame or outgoing message was dropped. Matches the reasons
/// the ingress path enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Duplicate,
    StaleTimestamp,
    UnknownSender,
    InvalidSignature,
    NotAMember,
    DecryptionFailed,
    RateLimited,
}

/// What the caller should do after feeding a frame or a local send through
/// the engine. The engine never touches the network or the UI itself.
#[derive(Debug, Clone)]
pub enum GossipAction {
    /// Re-wrap `message` with its decremented `ttl`/incremented
    /// `hop_count` and send it on to these peers.
    Forward {
        message: Message,
        to_peers: Vec<NodeId>,
    },
    /// Hand the decoded, access-control-cleared message to the
    /// application.
    Deliver(Message),
    /// Drop silently (or with a wire-level error code the caller decides
    /// whether to send).
    Drop { reason: DropReason },
}

/// Per-channel context the engine needs to validate and decrypt messages.
/// Membership and the symmetric key both live here rather than being
/// looked up ad hoc, since both are required together to satisfy the
/// access-control invariant: no plaintext leaves this engine for a
/// private channel unless the local node holds both the key and a
/// membership record for the sender.
#[derive(Debug, Clone)]
pub struct ChannelContext {
    pub encrypted: bool,
    pub symmetric_key: Option<[u8; 32]>,
    pub members: HashSet<NodeId>,
}

impl ChannelContext {
    pub fn public() -> Self {
        Self {
            encrypted: false,
            symmetric_key: None,
            members: HashSet::new(),
        }
    }

    pub fn is_member(&self, node_id: &NodeId) -> bool {
        self.members.contains(node_id)
    }
}

/// What the engine needs to know about the sender to verify a signature.
#[derive(Debug, Clone)]
pub struct SenderInfo {
    pub signing_public_key: VerifyingKeyBytes,
}

/// Public-facing category selector for [`GossipEngine::check_rate_limit`].
#[derive(Debug, Clone, Copy)]
pub enum RateLimitCategory {
    Messages,
    GossipForwarded,
    SyncRequests,
    PeerRequests,
}

impl RateLimitCategory {
    fn limit(&self) -> u32 {
        match self {
            RateLimitCategory::Messages => RATE_LIMIT_MESSAGES_PER_SEC,
            RateLimitCategory::GossipForwarded => RATE_LIMIT_GOSSIP_FORWARDED_PER_SEC,
            RateLimitCategory::SyncRequests => RATE_LIMIT_SYNC_REQUESTS_PER_MIN,
            RateLimitCategory::PeerRequests => RATE_LIMIT_PEER_REQUESTS_PER_MIN,
        }
    }

    fn window_secs(&self) -> i64 {
        match self {
            RateLimitCategory::Messages | RateLimitCategory::GossipForwarded => 1,
            RateLimitCategory::SyncRequests | RateLimitCategory::PeerRequests => 60,
        }
    }
}

/// A fixed-window counter: `(window_start, count)`. One per `(peer, category)`.
struct WindowCounter {
    window_start: AtomicI64,
    count: AtomicU32,
}

impl WindowCounter {
    fn new(now: i64) -> Self {
        Self {
            window_start: AtomicI64::new(now),
            count: AtomicU32::new(0),
        }
    }

    /// Returns `true` if this tick is within limit, rolling the window
    /// over once it has expired.
    fn tick(&self, now: i64, window_secs: i64, limit: u32) -> bool {
        let start = self.window_start.load(Ordering::Relaxed);
        if now - start >= window_secs {
            self.window_start.store(now, Ordering::Relaxed);
            self.count.store(1, Ordering::Relaxed);
            return true;
        }
        let prior = self.count.fetch_add(1, Ordering::Relaxed);
        prior < limit
    }
}

/// Tracks rate-limit state and consecutive-violation counts per peer.
struct PeerRateLimiter {
    messages: WindowCounter,
    gossip_forwarded: WindowCounter,
    sync_requests: WindowCounter,
    peer_requests: WindowCounter,
    consecutive_violations: AtomicU32,
}

impl PeerRateLimiter {
    fn new(now: i64) -> Self {
        Self {
            messages: WindowCounter::new(now),
            gossip_forwarded: WindowCounter::new(now),
            sync_requests: WindowCounter::new(now),
            peer_requests: WindowCounter::new(now),
            consecutive_violations: AtomicU32::new(0),
        }
    }

    fn counter(&self, category: &RateLimitCategory) -> &WindowCounter {
        match category {
            RateLimitCategory::Messages => &self.messages,
            RateLimitCategory::GossipForwarded => &self.gossip_forwarded,
            RateLimitCategory::SyncRequests => &self.sync_requests,
            RateLimitCategory::PeerRequests => &self.peer_requests,
        }
    }
}

/// Outcome of a rate-limit check: whether the tick is allowed, and whether
/// this peer has now crossed [`RATE_LIMIT_VIOLATIONS_BEFORE_CLOSE`] and
/// its session should be closed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitVerdict {
    pub allowed: bool,
    pub should_close_session: bool,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// One dedup-cache row: when the message was first seen locally.
#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    first_seen_at: i64,
}

/// The dissemination engine. Holds no sockets and no peer addresses —
/// only the dedup cache, rate limiters, and the handful of counters the
/// orchestrator surfaces as metrics.
pub struct GossipEngine {
    #[allow(dead_code)]
    local_node_id: NodeId,
    seen: DashMap<String, SeenEntry>,
    rate_limiters: DashMap<NodeId, PeerRateLimiter>,
    duplicates_dropped: AtomicU32,
    signature_failures: AtomicU32,
}

impl GossipEngine {
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            seen: DashMap::new(),
            rate_limiters: DashMap::new(),
            duplicates_dropped: AtomicU32::new(0),
            signature_failures: AtomicU32::new(0),
        }
    }

    pub fn duplicates_dropped(&self) -> u32 {
        self.duplicates_dropped.load(Ordering::Relaxed)
    }

    pub fn signature_failures(&self) -> u32 {
        self.signature_failures.load(Ordering::Relaxed)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, message_id: &str) -> bool {
        self.seen.contains_key(message_id)
    }

    fn mark_seen(&self, message_id: &str, now: i64) {
        self.seen.insert(message_id.to_string(), SeenEntry { first_seen_at: now });
        self.maybe_evict_seen_cache(now);
    }

    /// Prunes entries older than [`GOSSIP_CACHE_ENTRY_TTL`] once the cache
    /// exceeds [`GOSSIP_CACHE_SIZE`]; if still over budget, evicts the
    /// oldest remaining entries.
    fn maybe_evict_seen_cache(&self, now: i64) {
        if self.seen.len() <= GOSSIP_CACHE_SIZE {
            return;
        }
        let ttl = GOSSIP_CACHE_ENTRY_TTL.as_secs() as i64;
        let stale: Vec<String> = self
            .seen
            .iter()
            .filter(|entry| now - entry.value().first_seen_at > ttl)
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            self.seen.remove(&key);
        }
        if self.seen.len() <= GOSSIP_CACHE_SIZE {
            return;
        }
        let mut by_age: Vec<(String, i64)> = self
            .seen
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().first_seen_at))
            .collect();
        by_age.sort_by_key(|(_, first_seen_at)| *first_seen_at);
        let overflow = self.seen.len() - GOSSIP_CACHE_SIZE;
        for (key, _) in by_age.into_iter().take(overflow) {
            self.seen.remove(&key);
        }
    }

    /// Per-peer rate limiting. Call once per inbound frame, categorized
    /// by what the frame is. Three consecutive violations (any category)
    /// mark the session for closure.
    pub fn check_rate_limit(&self, peer: &NodeId, category: RateLimitCategory) -> RateLimitVerdict {
        let now = now_secs();
        let entry = self
            .rate_limiters
            .entry(peer.clone())
            .or_insert_with(|| PeerRateLimiter::new(now));
        let allowed = entry.counter(&category).tick(now, category.window_secs(), category.limit());

        let violations = if allowed {
            entry.consecutive_violations.store(0, Ordering::Relaxed);
            0
        } else {
            entry.consecutive_violations.fetch_add(1, Ordering::Relaxed) + 1
        };

        RateLimitVerdict {
            allowed,
            should_close_session: violations >= RATE_LIMIT_VIOLATIONS_BEFORE_CLOSE,
        }
    }

    /// Ingress path. Frame decode/schema validation happens one layer up
    /// in [`crate::network::fabric`] — by the time a [`Message`] reaches
    /// here it has already parsed.
    ///
    /// `channel_ctx` is `None` when the channel is entirely unknown to this
    /// node — treated as a fresh public channel, since private channels
    /// only ever become known via a successful invite.
    pub fn receive(
        &self,
        message: Message,
        from_peer: &NodeId,
        ttl: u8,
        hop_count: u8,
        sender: Option<&SenderInfo>,
        channel_ctx: Option<&ChannelContext>,
        live_peers: &[NodeId],
    ) -> GossipAction {
        let now = now_secs();

        if self.seen.contains_key(&message.id) {
            self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
            return GossipAction::Drop { reason: DropReason::Duplicate };
        }

        let age_floor = now - GOSSIP_MAX_MESSAGE_AGE.as_secs() as i64;
        let age_ceiling = now + GOSSIP_MAX_CLOCK_SKEW_FORWARD.as_secs() as i64;
        let ts = message.timestamp as i64;
        if ts < age_floor || ts > age_ceiling {
            debug!(message_id = %message.id, ts, "dropping message outside acceptable clock window");
            return GossipAction::Drop { reason: DropReason::StaleTimestamp };
        }

        let sender_info = match sender {
            Some(info) => info,
            None => {
                warn!(message_id = %message.id, sender = %message.sender_id, "unknown sender");
                return GossipAction::Drop { reason: DropReason::UnknownSender };
            }
        };

        let signature = match SignatureBytes::from_hex(&message.signature) {
            Ok(sig) => sig,
            Err(_) => {
                self.signature_failures.fetch_add(1, Ordering::Relaxed);
                return GossipAction::Drop { reason: DropReason::InvalidSignature };
            }
        };
        if !verify_canonical(&sender_info.signing_public_key, &message.signable_fields(), &signature) {
            self.signature_failures.fetch_add(1, Ordering::Relaxed);
            return GossipAction::Drop { reason: DropReason::InvalidSignature };
        }

        let mut delivered = message;

        if let Some(ctx) = channel_ctx {
            if ctx.encrypted {
                if !ctx.is_member(&delivered.sender_id) {
                    return GossipAction::Drop { reason: DropReason::NotAMember };
                }
                let key = match ctx.symmetric_key {
                    Some(key) => key,
                    None => return GossipAction::Drop { reason: DropReason::NotAMember },
                };
                let nonce = match delivered.nonce.as_deref() {
                    Some(n) => n,
                    None => return GossipAction::Drop { reason: DropReason::DecryptionFailed },
                };
                match encryption::open_message(&key, nonce, &delivered.content) {
                    Ok(plaintext) => match String::from_utf8(plaintext) {
                        Ok(text) => delivered.content = text,
                        Err(_) => return GossipAction::Drop { reason: DropReason::DecryptionFailed },
                    },
                    Err(_) => return GossipAction::Drop { reason: DropReason::DecryptionFailed },
                }
            }
        }

        self.mark_seen(&delivered.id, now);

        if ttl == 0 {
            return GossipAction::Deliver(delivered);
        }

        let mut candidates: Vec<NodeId> = live_peers
            .iter()
            .filter(|p| *p != from_peer && **p != delivered.sender_id)
            .cloned()
            .collect();
        let mut rng = rand::thread_rng();
        candidates.shuffle(&mut rng);
        candidates.truncate(GOSSIP_FANOUT);

        let mut forwarded = delivered;
        forwarded.ttl = ttl - 1;
        forwarded.hop_count = hop_count.saturating_add(1);

        GossipAction::Forward {
            message: forwarded,
            to_peers: candidates,
        }
    }

    /// Egress path. Sealing and signing are the caller's job — the
    /// orchestrator is the one holding
    /// the local identity and any channel key — so by the time a message
    /// reaches here it is already a complete, signed [`Message`]; this
    /// just handles dedup bookkeeping and fanout sampling.
    pub fn broadcast(&self, message: Message, live_peers: &[NodeId]) -> GossipAction {
        let now = now_secs();
        self.mark_seen(&message.id, now);

        let mut candidates: Vec<NodeId> = live_peers.to_vec();
        let mut rng = rand::thread_rng();
        candidates.shuffle(&mut rng);
        candidates.truncate(GOSSIP_FANOUT);

        GossipAction::Forward {
            message,
            to_peers: candidates,
        }
    }

    pub fn default_ttl() -> u8 {
        GOSSIP_TTL_DEFAULT
    }
}
