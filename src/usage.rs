//! Usage bookkeeping (spec §3, §4.3.4, §8.1).

use std::time::Duration;

/// Usage bookkeeping is refreshed when older than this, or when unknown.
pub const REFRESH_AFTER: Duration = Duration::from_secs(60 * 60);

/// A point-in-time snapshot of the account's remaining allowance.
///
/// `unknown()` until the first observation; refreshed whenever a
/// non-ticket response carries allowance fields, or explicitly via
/// `get_usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub requests_remaining: Option<i64>,
    pub bits_remaining: Option<i64>,
    /// Monotonic millis (per [`crate::clock::Clock`]) at which this snapshot
    /// was taken; `None` means "never observed".
    observed_at_millis: Option<u64>,
}

impl UsageSnapshot {
    pub fn unknown() -> Self {
        Self { requests_remaining: None, bits_remaining: None, observed_at_millis: None }
    }

    pub fn observe(requests_remaining: i64, bits_remaining: i64, now_millis: u64) -> Self {
        Self {
            requests_remaining: Some(requests_remaining),
            bits_remaining: Some(bits_remaining),
            observed_at_millis: Some(now_millis),
        }
    }

    /// True if this snapshot is unknown or older than [`REFRESH_AFTER`].
    pub fn is_stale(&self, now_millis: u64) -> bool {
        match self.observed_at_millis {
            None => true,
            Some(observed) => {
                Duration::from_millis(now_millis.saturating_sub(observed)) >= REFRESH_AFTER
            }
        }
    }
}

impl Default for UsageSnapshot {
    fn default() -> Self {
        Self::unknown()
    }
}
