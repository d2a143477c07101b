//! The transactional store primitive consumed by the directory layer.
//!
//! A store exposes optimistic transactions over an ordered byte keyspace:
//! reads happen at a fixed read version, writes are buffered until commit,
//! and commit fails with a retryable conflict when a concurrent commit wrote
//! anything this transaction read without the `snapshot` flag.

use std::fmt;

use async_trait::async_trait;

use crate::error::KvError;
use crate::retry::RetryPolicy;

/// Options for [`Transaction::get_range`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Maximum number of pairs to return. `None` reads the whole range.
    pub limit: Option<usize>,
    /// Return pairs in descending key order.
    pub reverse: bool,
}

impl RangeOptions {
    /// Read at most `limit` pairs in ascending order.
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            reverse: false,
        }
    }

    /// Read in descending key order.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// A key-value pair returned by a range read.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key.
    pub key: Vec<u8>,
    /// The value.
    pub value: Vec<u8>,
}

impl fmt::Debug for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", hex::encode(&self.key), hex::encode(&self.value))
    }
}

/// One optimistic transaction.
///
/// Reads are asynchronous suspension points and may be issued concurrently
/// from one transaction. Writes are buffered locally and never fail
/// immediately; invalid writes surface from [`commit`](Transaction::commit).
#[async_trait]
pub trait Transaction: Send + Sync + 'static {
    /// Read a single key.
    ///
    /// A `snapshot` read does not add a read conflict.
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, KvError>;

    /// Read the pairs in `[begin, end)`.
    async fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        options: RangeOptions,
        snapshot: bool,
    ) -> Result<Vec<KeyValue>, KvError>;

    /// Write a key.
    fn set(&self, key: &[u8], value: &[u8]);

    /// Delete a key.
    fn clear(&self, key: &[u8]);

    /// Delete every key in `[begin, end)`.
    fn clear_range(&self, begin: &[u8], end: &[u8]);

    /// Add `delta` to the little-endian signed 64-bit integer stored at `key`.
    ///
    /// Missing values count as zero. Atomic adds do not read the key, so they
    /// never cause a read conflict.
    fn atomic_add(&self, key: &[u8], delta: i64);

    /// Make `key` conflict with concurrent readers as if it had been written.
    fn add_write_conflict_key(&self, key: &[u8]);

    /// Suppress the write conflict range of the next write only.
    fn set_next_write_no_write_conflict_range(&self);

    /// Commit buffered writes.
    async fn commit(&self) -> Result<(), KvError>;
}

/// A store that hands out transactions.
pub trait Database: Send + Sync {
    /// Transaction type produced by this store.
    type Transaction: Transaction;

    /// Begin a new transaction.
    fn create_transaction(&self) -> Result<Self::Transaction, KvError>;

    /// Retry policy used when this database runs a transaction body.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

impl<D: Database + ?Sized> Database for std::sync::Arc<D> {
    type Transaction = D::Transaction;

    fn create_transaction(&self) -> Result<Self::Transaction, KvError> {
        (**self).create_transaction()
    }

    fn retry_policy(&self) -> RetryPolicy {
        (**self).retry_policy()
    }
}
