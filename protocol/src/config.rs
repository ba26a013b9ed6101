//! # Protocol Configuration & Constants
//!
//! Every magic number in TAD lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Wire protocol version string, sent in `HELLO`/`WELCOME` and compared
/// during handshake. A mismatch with no overlap closes the session with
/// `PROTOCOL_VERSION_MISMATCH`.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// `_service._proto.` label mDNS advertises under.
pub const MDNS_SERVICE_TYPE: &str = "_tad._tcp.local.";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

pub const SIGNING_ALGORITHM: &str = "Ed25519";
pub const SIGNING_KEY_LENGTH: usize = 32;
pub const VERIFYING_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

pub const KEY_EXCHANGE_ALGORITHM: &str = "X25519";

pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";
pub const AES_KEY_LENGTH: usize = 32;
pub const AES_NONCE_LENGTH: usize = 12;
pub const AES_TAG_LENGTH: usize = 16;

/// Length, in bytes, node IDs are truncated to before Base32 encoding.
pub const NODE_ID_TRUNCATED_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// Outbound/inbound dial connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A session is considered dead after this long without activity — three
/// missed heartbeats at [`HEARTBEAT_INTERVAL`].
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// PING/PONG cadence that keeps [`READ_IDLE_TIMEOUT`] from tripping on a
/// merely-quiet (not dead) session.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period tasks get to release sockets and flush pending disk writes
/// during shutdown.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Gossip Parameters
// ---------------------------------------------------------------------------

/// Number of distinct live peers each message is forwarded to.
pub const GOSSIP_FANOUT: usize = 3;

/// Hop budget a freshly originated message starts with.
pub const GOSSIP_TTL_DEFAULT: u8 = 5;

/// Soft cap on the dedup cache before eviction kicks in.
pub const GOSSIP_CACHE_SIZE: usize = 10_000;

/// Age past which a dedup cache entry becomes eligible for pruning.
pub const GOSSIP_CACHE_ENTRY_TTL: Duration = Duration::from_secs(3_600);

/// Messages with a `timestamp` further than this into the past are dropped
/// as stale.
pub const GOSSIP_MAX_MESSAGE_AGE: Duration = Duration::from_secs(86_400);

/// Messages with a `timestamp` further than this into the future are
/// dropped as clearly wrong.
pub const GOSSIP_MAX_CLOCK_SKEW_FORWARD: Duration = Duration::from_secs(60);

/// Per-peer rate limits. Each is a `(limit, window)` pair enforced by a
/// fixed-window counter.
pub const RATE_LIMIT_MESSAGES_PER_SEC: u32 = 10;
pub const RATE_LIMIT_GOSSIP_FORWARDED_PER_SEC: u32 = 50;
pub const RATE_LIMIT_SYNC_REQUESTS_PER_MIN: u32 = 5;
pub const RATE_LIMIT_PEER_REQUESTS_PER_MIN: u32 = 10;

/// Consecutive rate-limit violations (any category) before a session is
/// closed outright.
pub const RATE_LIMIT_VIOLATIONS_BEFORE_CLOSE: u32 = 3;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8765;

/// Maximum on-wire frame size; larger frames close the session.
pub const MAX_FRAME_SIZE_BYTES: usize = 64 * 1024;

/// Unparseable frames tolerated on one session before it's closed.
pub const MAX_MALFORMED_FRAMES_BEFORE_CLOSE: u32 = 5;

/// Invite replay-guard window: invites whose `issued_at` is older than
/// this are dropped regardless of whether they were already processed.
pub const INVITE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3_600);

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Current Unix time in seconds. Centralized so every component measures
/// "now" the same way.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(SIGNING_KEY_LENGTH, 32);
        assert_eq!(VERIFYING_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(NODE_ID_TRUNCATED_LENGTH, 20);
    }

    #[test]
    fn test_heartbeat_fits_within_idle_timeout_three_times() {
        // READ_IDLE_TIMEOUT is specified as "3 missed heartbeats".
        assert_eq!(READ_IDLE_TIMEOUT, HEARTBEAT_INTERVAL * 3);
    }

    #[test]
    fn test_gossip_defaults_are_sane() {
        assert_eq!(GOSSIP_FANOUT, 3);
        assert_eq!(GOSSIP_TTL_DEFAULT, 5);
        assert_eq!(GOSSIP_CACHE_SIZE, 10_000);
        assert_eq!(GOSSIP_CACHE_ENTRY_TTL, Duration::from_secs(3_600));
    }

    #[test]
    fn test_rate_limits_are_positive() {
        assert!(RATE_LIMIT_MESSAGES_PER_SEC > 0);
        assert!(RATE_LIMIT_GOSSIP_FORWARDED_PER_SEC > RATE_LIMIT_MESSAGES_PER_SEC);
        assert!(RATE_LIMIT_VIOLATIONS_BEFORE_CLOSE > 0);
    }

    #[test]
    fn test_default_port_and_frame_size() {
        assert_eq!(DEFAULT_PORT, 8765);
        assert_eq!(MAX_FRAME_SIZE_BYTES, 65_536);
    }

    #[test]
    fn test_mdns_service_type_format() {
        assert!(MDNS_SERVICE_TYPE.starts_with("_tad"));
        assert!(MDNS_SERVICE_TYPE.ends_with(".local."));
    }

    #[test]
    fn test_now_unix_is_plausible() {
        // Any time after 2020-01-01 — sanity check, not a precise bound.
        assert!(now_unix() > 1_577_836_800);
    }
}
