#![forbid(unsafe_code)]

use std::collections::HashSet;

/// Default maximum serialized event size in bytes.
pub const DEFAULT_MAX_EVENT_SIZE: usize = 65536;
/// Default maximum concurrent subscriptions per client.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 20;
/// Default late-publication window in seconds.
pub const DEFAULT_LATE_PUBLICATION_WINDOW: i64 = 3600;
/// Tolerated clock skew for events dated in the future, in seconds.
pub const FUTURE_SKEW: i64 = 900;
/// How long an AUTH event stays fresh, in seconds.
pub const AUTH_EVENT_WINDOW: i64 = 600;

/// Relay configuration. Defaults follow the documented MVP values;
/// `min_previous_refs` is 0 there and 3 in strict deployments.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub max_event_size: usize,
    pub max_subscriptions: usize,
    pub require_auth: bool,
    pub late_publication_window: i64,
    pub min_previous_refs: usize,
    /// When set, events of any other kind are rejected as `blocked:`.
    pub allowed_kinds: Option<HashSet<u16>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            require_auth: false,
            late_publication_window: DEFAULT_LATE_PUBLICATION_WINDOW,
            min_previous_refs: 0,
            allowed_kinds: None,
        }
    }
}

impl RelayConfig {
    /// Strict-mode profile: AUTH required and three timeline references.
    pub fn strict() -> Self {
        Self {
            require_auth: true,
            min_previous_refs: 3,
            ..Self::default()
        }
    }
}
