//! High-contention allocator for short, unique key prefixes.
//!
//! Hands out small integers, tuple-encoded, that are unique across every
//! transaction that commits against the same allocator subspace. Concurrent
//! allocations rarely conflict:
//!
//! - counters are bumped with atomic adds and read at snapshot isolation
//! - candidates are picked at random inside the current window
//! - only the winning candidate key carries a write conflict
//!
//! # Layout
//!
//! ```text
//! <subspace> [0, window_start] -> i64 LE   allocations started in the window
//! <subspace> [1, candidate]    -> ""       claimed candidates
//! ```
//!
//! A window is abandoned once half of its slots have been handed out, and
//! both ranges below the new window start are cleared.

use keystone_kv::KvError;
use keystone_kv::RangeOptions;
use keystone_kv::TransactError;
use keystone_kv::Transaction;
use keystone_kv::TransactionContext;
use keystone_layer::CounterEncoding;
use keystone_layer::Element;
use keystone_layer::Subspace;
use keystone_layer::SubspaceError;
use keystone_layer::Transformer;
use keystone_layer::Tuple;
use keystone_layer::TupleEncoding;
use keystone_layer::VoidEncoding;
use rand::Rng;
use snafu::ResultExt;
use snafu::Snafu;
use tracing::debug;

use crate::constants::HCA_COUNTERS_KEY;
use crate::constants::HCA_RECENT_KEY;
use crate::verified::window_has_room;
use crate::verified::window_size;

/// Errors from prefix allocation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AllocationError {
    /// The store rejected a read or the attempt.
    #[snafu(display("allocator storage error: {source}"))]
    Storage {
        /// The underlying store error.
        source: KvError,
    },

    /// The allocator subspace holds data it did not write.
    #[snafu(display("corrupted allocator state: {reason}"))]
    CorruptedState {
        /// What was found.
        reason: String,
    },

    /// A counter value could not be decoded.
    #[snafu(display("allocator value encoding error: {source}"))]
    Encoding {
        /// The underlying subspace error.
        source: SubspaceError,
    },
}

impl From<KvError> for AllocationError {
    fn from(source: KvError) -> Self {
        AllocationError::Storage { source }
    }
}

impl TransactError for AllocationError {
    fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::Storage { source } if source.is_retryable())
    }
}

/// Result of trying to claim one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimOutcome {
    /// The candidate was free and is now claimed by this transaction.
    Claimed(i64),
    /// Another allocation already claimed the candidate.
    InUse,
    /// The window advanced past the one being searched.
    WindowMoved,
}

/// Snapshot of the allocator's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorWindow {
    /// First integer of the window.
    pub start: i64,
    /// Allocations started in the window.
    pub count: i64,
}

impl AllocatorWindow {
    /// Number of integers in the window.
    pub fn size(&self) -> i64 {
        window_size(self.start)
    }
}

/// Allocates unique byte strings under a subspace.
///
/// Cheap to clone. Any number of allocations may run concurrently, within
/// one transaction or across many.
#[derive(Debug, Clone)]
pub struct HighContentionAllocator {
    counters: Subspace<TupleEncoding, CounterEncoding>,
    recent: Subspace<TupleEncoding, VoidEncoding>,
}

impl HighContentionAllocator {
    /// Create an allocator whose state lives under `subspace`.
    pub fn new<K: Transformer, V: Transformer>(subspace: &Subspace<K, V>) -> Self {
        let base: Subspace = Subspace::from_bytes(subspace.prefix().to_vec());
        Self {
            counters: base.subspace(&Tuple::new().push(HCA_COUNTERS_KEY)).with_value_encoding(CounterEncoding),
            recent: base.subspace(&Tuple::new().push(HCA_RECENT_KEY)).with_value_encoding(VoidEncoding),
        }
    }

    /// Allocate a unique value, returned tuple-encoded.
    ///
    /// Uniqueness holds once `tr` commits. The value is never handed out
    /// again by this allocator to any transaction that commits.
    pub async fn allocate<T: Transaction>(&self, tr: &TransactionContext<T>) -> Result<Vec<u8>, AllocationError> {
        loop {
            let (start, window) = self.claim_window(tr).await?;

            match self.search_window(tr, start, window).await? {
                Some(candidate) => {
                    debug!(candidate, window_start = start, "allocated prefix");
                    return Ok(Tuple::new().push(candidate).pack());
                }
                // The window moved while searching; pick it up again.
                None => continue,
            }
        }
    }

    /// Read the current window at snapshot isolation.
    ///
    /// Returns the zero window when nothing has been allocated yet.
    pub async fn current_window<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
    ) -> Result<AllocatorWindow, AllocationError> {
        let range = self.counters.range();
        let latest = tr
            .get_range(&range.begin, &range.end, RangeOptions::limit(1).reversed(), true)
            .await
            .context(StorageSnafu)?;

        let Some(kv) = latest.first() else {
            return Ok(AllocatorWindow::default());
        };

        let start = self
            .counters
            .unpack(&kv.key)
            .ok()
            .and_then(|t| t.get(0).and_then(Element::as_int))
            .ok_or_else(|| AllocationError::CorruptedState {
                reason: format!("counter key {} is not an integer tuple", hex::encode(&kv.key)),
            })?;
        let count = self.counters.unpack_value(&kv.value).context(EncodingSnafu)?;

        Ok(AllocatorWindow { start, count })
    }

    /// Count one allocation against the current window, advancing the
    /// window while it is at least half full.
    async fn claim_window<T: Transaction>(&self, tr: &TransactionContext<T>) -> Result<(i64, i64), AllocationError> {
        let mut start = self.current_window(tr).await?.start;
        let mut advanced = false;

        loop {
            let count = {
                let _guard = tr.exclusive().await;

                if advanced {
                    self.clear_below(tr, start);
                }

                let counter_key = self.counters.pack(&Tuple::new().push(start));
                tr.atomic_add(&counter_key, 1);
                match tr.get(&counter_key, true).await.context(StorageSnafu)? {
                    Some(raw) => self.counters.unpack_value(&raw).context(EncodingSnafu)?,
                    None => 0,
                }
            };

            let window = window_size(start);
            if window_has_room(count, window) {
                return Ok((start, window));
            }

            start = start.checked_add(window).ok_or_else(|| AllocationError::CorruptedState {
                reason: format!("window start {start} cannot advance"),
            })?;
            advanced = true;
            debug!(window_start = start, window_size = window_size(start), "advancing allocation window");
        }
    }

    /// Drop counters and claims of every window below `start`.
    ///
    /// Caller holds the context's exclusive section.
    fn clear_below<T: Transaction>(&self, tr: &TransactionContext<T>, start: i64) {
        let start_key = Tuple::new().push(start);
        tr.clear_range(self.counters.prefix(), &self.counters.pack(&start_key));
        tr.set_next_write_no_write_conflict_range();
        tr.clear_range(self.recent.prefix(), &self.recent.pack(&start_key));
    }

    /// Pick random candidates in `[start, start + window)` until one is
    /// claimed. Returns `None` if the window moved in the meantime.
    async fn search_window<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        start: i64,
        window: i64,
    ) -> Result<Option<i64>, AllocationError> {
        loop {
            let candidate = start + rand::rng().random_range(0..window);

            match self.try_claim(tr, start, candidate).await? {
                ClaimOutcome::Claimed(value) => return Ok(Some(value)),
                ClaimOutcome::WindowMoved => return Ok(None),
                ClaimOutcome::InUse => continue,
            }
        }
    }

    async fn try_claim<T: Transaction>(
        &self,
        tr: &TransactionContext<T>,
        start: i64,
        candidate: i64,
    ) -> Result<ClaimOutcome, AllocationError> {
        let candidate_key = self.recent.pack(&Tuple::new().push(candidate));

        let (latest_start, in_use) = {
            let _guard = tr.exclusive().await;

            let latest_start = self.current_window(tr).await?.start;
            // Non-snapshot: a concurrent claim of the same candidate must
            // conflict with this one.
            let in_use = tr.get(&candidate_key, false).await.context(StorageSnafu)?.is_some();

            tr.set_next_write_no_write_conflict_range();
            tr.set(&candidate_key, &[]);

            (latest_start, in_use)
        };

        if latest_start > start {
            return Ok(ClaimOutcome::WindowMoved);
        }
        if in_use {
            return Ok(ClaimOutcome::InUse);
        }

        tr.add_write_conflict_key(&candidate_key);
        Ok(ClaimOutcome::Claimed(candidate))
    }
}
