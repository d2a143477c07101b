//! Errors raised by the transactional store primitive.

use snafu::Snafu;

/// Errors returned by [`Transaction`](crate::Transaction) and
/// [`Database`](crate::Database) implementations.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum KvError {
    /// Commit failed because a concurrent transaction wrote data this one read.
    #[snafu(display("transaction not committed due to conflict with another transaction"))]
    NotCommitted,

    /// The transaction's read version is older than the store still tracks.
    #[snafu(display("transaction read version {read_version} is older than oldest tracked version {oldest_version}"))]
    TransactionTooOld {
        /// Version the transaction read at.
        read_version: u64,
        /// Oldest version the store can still check conflicts against.
        oldest_version: u64,
    },

    /// A key exceeded the store's size limit.
    #[snafu(display("key size {size} exceeds maximum of {max} bytes"))]
    KeyTooLarge {
        /// Actual key size.
        size: usize,
        /// Maximum key size.
        max: usize,
    },

    /// A value exceeded the store's size limit.
    #[snafu(display("value size {size} exceeds maximum of {max} bytes"))]
    ValueTooLarge {
        /// Actual value size.
        size: usize,
        /// Maximum value size.
        max: usize,
    },

    /// A range had its end before its begin.
    #[snafu(display("invalid range [{}, {})", hex::encode(begin), hex::encode(end)))]
    InvalidRange {
        /// Range start.
        begin: Vec<u8>,
        /// Range end.
        end: Vec<u8>,
    },

    /// The transaction was used after it committed.
    #[snafu(display("transaction already committed"))]
    AlreadyCommitted,

    /// Any other store failure.
    #[snafu(display("operation failed: {reason}"))]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl KvError {
    /// Returns true for transient failures that a fresh attempt may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::NotCommitted | KvError::TransactionTooOld { .. })
    }
}
