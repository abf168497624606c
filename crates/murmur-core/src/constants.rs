//! Application-wide constants
//!
//! Centralized location for relay defaults, timeouts and the event kinds
//! the client understands.

/// Relays used when no configuration is supplied
pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://nos.lol", "wss://relay.primal.net"];

/// How long a fetch waits on relays before settling for what it has
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;

/// Bound on the initial relay connect
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// How long to poll for at least one connected relay after connect returns
pub const CONNECT_VERIFY_TIMEOUT_MS: u64 = 5_000;

/// Bound on a single publish round-trip
pub const PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Cached profiles older than this are refetched
pub const PROFILE_STALE_SECS: u64 = 60 * 60; // 1 hour

pub const DEFAULT_FEED_LIMIT: usize = 50;

/// Trending looks at posts from the last day
pub const TRENDING_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Number of recent posts sampled when ranking trending content
pub const TRENDING_SAMPLE_SIZE: usize = 200;

/// Default reaction content (a "like")
pub const DEFAULT_REACTION: &str = "+";
pub const DISLIKE_REACTION: &str = "-";

// Nostr event kinds used by murmur
pub mod kinds {
    /// Profile metadata (NIP-01)
    pub const METADATA: u16 = 0;
    /// Short text note: posts and replies
    pub const TEXT_NOTE: u16 = 1;
    /// Contact list (NIP-02)
    pub const CONTACT_LIST: u16 = 3;
    /// Encrypted direct message (NIP-04)
    pub const ENCRYPTED_DIRECT_MESSAGE: u16 = 4;
    /// Repost (NIP-18)
    pub const REPOST: u16 = 6;
    /// Reaction (NIP-25)
    pub const REACTION: u16 = 7;
}
