//! Retry policy for the transaction runner.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Default number of attempts before a retryable error is surfaced.
///
/// Bounded so a hot conflict cannot spin a caller forever.
pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: u32 = 100;

/// Backoff before the first retry, in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1;

/// Upper bound on the backoff between retries, in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 128;

const _: () = assert!(DEFAULT_MAX_TRANSACTION_ATTEMPTS > 0);
const _: () = assert!(DEFAULT_INITIAL_BACKOFF_MS > 0);
const _: () = assert!(DEFAULT_INITIAL_BACKOFF_MS <= DEFAULT_MAX_BACKOFF_MS);

/// How a [`Database`](crate::Database) retries transaction bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff_ms: u64,
    /// Backoff cap; the delay doubles after each retry until it reaches this.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms.max(self.initial_backoff_ms));
        Duration::from_millis(ms)
    }
}
