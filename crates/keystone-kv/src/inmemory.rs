//! In-memory implementation of [`Database`] for testing and embedding.
//!
//! [`MemoryDatabase`] is an ordered map with optimistic multi-version
//! concurrency control. Each transaction reads from the snapshot taken when it
//! began plus its own buffered writes. Commit checks the transaction's read
//! conflict ranges against the write conflict ranges of every commit that
//! landed after its read version, and fails with [`KvError::NotCommitted`] on
//! overlap. Reads yield to the scheduler first so sub-operations issued
//! concurrently within one transaction actually interleave.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::KvError;
use crate::retry::RetryPolicy;
use crate::transaction::Database;
use crate::transaction::KeyValue;
use crate::transaction::RangeOptions;
use crate::transaction::Transaction;

/// Maximum key size accepted by the in-memory store, in bytes.
pub const MAX_KEY_SIZE: usize = 10_000;

/// Maximum value size accepted by the in-memory store, in bytes.
pub const MAX_VALUE_SIZE: usize = 100_000;

/// Number of commits whose write ranges are kept for conflict checks.
///
/// A transaction whose read version predates the oldest kept commit fails
/// with [`KvError::TransactionTooOld`].
pub const DEFAULT_COMMIT_LOG_CAPACITY: usize = 10_000;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Clone)]
struct ConflictRange {
    begin: Vec<u8>,
    end: Vec<u8>,
}

impl ConflictRange {
    fn key(key: &[u8]) -> Self {
        let mut end = Vec::with_capacity(key.len() + 1);
        end.extend_from_slice(key);
        end.push(0x00);
        Self {
            begin: key.to_vec(),
            end,
        }
    }

    fn range(begin: &[u8], end: &[u8]) -> Self {
        Self {
            begin: begin.to_vec(),
            end: end.to_vec(),
        }
    }

    fn intersects(&self, other: &ConflictRange) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

enum Mutation {
    Set { key: Vec<u8>, value: Vec<u8> },
    Clear { key: Vec<u8> },
    ClearRange { begin: Vec<u8>, end: Vec<u8> },
    Add { key: Vec<u8>, delta: i64 },
}

impl Mutation {
    fn apply(&self, map: &mut Map) {
        match self {
            Mutation::Set { key, value } => {
                map.insert(key.clone(), value.clone());
            }
            Mutation::Clear { key } => {
                map.remove(key);
            }
            Mutation::ClearRange { begin, end } => clear_range_in(map, begin, end),
            Mutation::Add { key, delta } => {
                let sum = add_le(map.get(key).map(Vec::as_slice), *delta);
                map.insert(key.clone(), sum);
            }
        }
    }
}

/// Little-endian wrapping add over a value zero-extended or truncated to 8 bytes.
fn add_le(existing: Option<&[u8]>, delta: i64) -> Vec<u8> {
    let mut raw = [0u8; 8];
    if let Some(bytes) = existing {
        let n = bytes.len().min(8);
        raw[..n].copy_from_slice(&bytes[..n]);
    }
    i64::from_le_bytes(raw).wrapping_add(delta).to_le_bytes().to_vec()
}

fn clear_range_in(map: &mut Map, begin: &[u8], end: &[u8]) {
    if begin >= end {
        return;
    }
    let doomed: Vec<Vec<u8>> = map
        .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
        .map(|(k, _)| k.clone())
        .collect();
    for key in doomed {
        map.remove(&key);
    }
}

struct CommitRecord {
    version: u64,
    writes: Vec<ConflictRange>,
}

struct StoreState {
    data: Arc<Map>,
    version: u64,
    commits: VecDeque<CommitRecord>,
    /// Transactions reading below this version can no longer be checked.
    oldest_version: u64,
}

struct Shared {
    state: Mutex<StoreState>,
    log_capacity: usize,
}

/// In-memory ordered store with optimistic transactions.
///
/// # Example
///
/// ```
/// use keystone_kv::KvError;
/// use keystone_kv::MemoryDatabase;
/// use keystone_kv::Transaction;
/// use keystone_kv::Transactor;
///
/// # tokio_test_block_on(async {
/// let db = MemoryDatabase::new();
/// db.transact(|tr| async move {
///     tr.set(b"hello", b"world");
///     Ok::<_, KvError>(())
/// })
/// .await?;
/// assert_eq!(db.read(b"hello"), Some(b"world".to_vec()));
/// # Ok::<_, KvError>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct MemoryDatabase {
    shared: Arc<Shared>,
    retry: RetryPolicy,
}

impl MemoryDatabase {
    /// Create an empty store with the default retry policy.
    pub fn new() -> Arc<Self> {
        Self::with_retry_policy(RetryPolicy::default())
    }

    /// Create an empty store with a custom retry policy.
    pub fn with_retry_policy(retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self::build(retry, DEFAULT_COMMIT_LOG_CAPACITY))
    }

    /// Create an empty store that keeps at most `capacity` commits for
    /// conflict checking.
    pub fn with_commit_log_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self::build(RetryPolicy::default(), capacity.max(1)))
    }

    fn build(retry: RetryPolicy, log_capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState {
                    data: Arc::new(Map::new()),
                    version: 0,
                    commits: VecDeque::new(),
                    oldest_version: 0,
                }),
                log_capacity,
            }),
            retry,
        }
    }

    /// Read the latest committed value of a key outside any transaction.
    pub fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.shared.state.lock().data.get(key).cloned()
    }

    /// All committed pairs in key order.
    pub fn dump(&self) -> Vec<KeyValue> {
        let data = Arc::clone(&self.shared.state.lock().data);
        data.iter()
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Latest committed version.
    pub fn committed_version(&self) -> u64 {
        self.shared.state.lock().version
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MemoryDatabase")
            .field("version", &state.version)
            .field("keys", &state.data.len())
            .finish()
    }
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn create_transaction(&self) -> Result<MemoryTransaction, KvError> {
        let (read_version, snapshot) = {
            let state = self.shared.state.lock();
            (state.version, Arc::clone(&state.data))
        };
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            read_version,
            local: Mutex::new(LocalState {
                view: snapshot,
                mutations: Vec::new(),
                reads: Vec::new(),
                writes: Vec::new(),
                skip_next_write_conflict: false,
                deferred: None,
                committed: false,
            }),
        })
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

struct LocalState {
    /// Snapshot at the read version with this transaction's writes applied.
    view: Arc<Map>,
    mutations: Vec<Mutation>,
    reads: Vec<ConflictRange>,
    writes: Vec<ConflictRange>,
    skip_next_write_conflict: bool,
    /// First invalid write, reported at commit.
    deferred: Option<KvError>,
    committed: bool,
}

impl LocalState {
    fn ensure_open(&self) -> Result<(), KvError> {
        if self.committed {
            return Err(KvError::AlreadyCommitted);
        }
        Ok(())
    }

    fn defer(&mut self, err: KvError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    fn writable(&mut self) -> bool {
        if self.committed {
            self.defer(KvError::AlreadyCommitted);
            return false;
        }
        true
    }

    fn check_key(&mut self, key: &[u8]) -> bool {
        if key.len() > MAX_KEY_SIZE {
            self.defer(KvError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
            return false;
        }
        true
    }

    fn record_write(&mut self, range: ConflictRange) {
        if std::mem::take(&mut self.skip_next_write_conflict) {
            return;
        }
        if !range.is_empty() {
            self.writes.push(range);
        }
    }

    fn record_read(&mut self, range: ConflictRange) {
        if !range.is_empty() {
            self.reads.push(range);
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        mutation.apply(Arc::make_mut(&mut self.view));
        self.mutations.push(mutation);
    }
}

/// A transaction on a [`MemoryDatabase`].
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    read_version: u64,
    local: Mutex<LocalState>,
}

impl MemoryTransaction {
    /// Version this transaction reads at.
    pub fn read_version(&self) -> u64 {
        self.read_version
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, KvError> {
        tokio::task::yield_now().await;

        let mut local = self.local.lock();
        local.ensure_open()?;
        if !snapshot {
            local.record_read(ConflictRange::key(key));
        }
        Ok(local.view.get(key).cloned())
    }

    async fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        options: RangeOptions,
        snapshot: bool,
    ) -> Result<Vec<KeyValue>, KvError> {
        if begin > end {
            return Err(KvError::InvalidRange {
                begin: begin.to_vec(),
                end: end.to_vec(),
            });
        }
        tokio::task::yield_now().await;

        let mut local = self.local.lock();
        local.ensure_open()?;

        let limit = options.limit.unwrap_or(usize::MAX);
        let results: Vec<KeyValue> = if begin == end || limit == 0 {
            Vec::new()
        } else {
            let range = local.view.range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)));
            let to_pair = |(key, value): (&Vec<u8>, &Vec<u8>)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            };
            if options.reverse {
                range.rev().take(limit).map(to_pair).collect()
            } else {
                range.take(limit).map(to_pair).collect()
            }
        };

        if !snapshot {
            // A limited read only depends on the part of the range it saw.
            let conflict = match results.last() {
                Some(last) if results.len() == limit => {
                    if options.reverse {
                        ConflictRange::range(&last.key, end)
                    } else {
                        ConflictRange::range(begin, &ConflictRange::key(&last.key).end)
                    }
                }
                _ => ConflictRange::range(begin, end),
            };
            local.record_read(conflict);
        }

        Ok(results)
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        let mut local = self.local.lock();
        if !local.writable() || !local.check_key(key) {
            return;
        }
        if value.len() > MAX_VALUE_SIZE {
            local.defer(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
            return;
        }
        local.record_write(ConflictRange::key(key));
        local.apply(Mutation::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    fn clear(&self, key: &[u8]) {
        let mut local = self.local.lock();
        if !local.writable() || !local.check_key(key) {
            return;
        }
        local.record_write(ConflictRange::key(key));
        local.apply(Mutation::Clear { key: key.to_vec() });
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) {
        let mut local = self.local.lock();
        if !local.writable() {
            return;
        }
        if begin > end {
            local.defer(KvError::InvalidRange {
                begin: begin.to_vec(),
                end: end.to_vec(),
            });
            return;
        }
        local.record_write(ConflictRange::range(begin, end));
        local.apply(Mutation::ClearRange {
            begin: begin.to_vec(),
            end: end.to_vec(),
        });
    }

    fn atomic_add(&self, key: &[u8], delta: i64) {
        let mut local = self.local.lock();
        if !local.writable() || !local.check_key(key) {
            return;
        }
        local.record_write(ConflictRange::key(key));
        local.apply(Mutation::Add {
            key: key.to_vec(),
            delta,
        });
    }

    fn add_write_conflict_key(&self, key: &[u8]) {
        let mut local = self.local.lock();
        if local.writable() {
            local.writes.push(ConflictRange::key(key));
        }
    }

    fn set_next_write_no_write_conflict_range(&self) {
        self.local.lock().skip_next_write_conflict = true;
    }

    async fn commit(&self) -> Result<(), KvError> {
        let (mutations, reads, writes) = {
            let mut local = self.local.lock();
            local.ensure_open()?;
            local.committed = true;
            if let Some(err) = local.deferred.take() {
                return Err(err);
            }
            (
                std::mem::take(&mut local.mutations),
                std::mem::take(&mut local.reads),
                std::mem::take(&mut local.writes),
            )
        };

        if mutations.is_empty() && writes.is_empty() {
            return Ok(());
        }

        let mut state = self.shared.state.lock();

        if !reads.is_empty() {
            if self.read_version < state.oldest_version {
                return Err(KvError::TransactionTooOld {
                    read_version: self.read_version,
                    oldest_version: state.oldest_version,
                });
            }
            let conflicted = state
                .commits
                .iter()
                .filter(|record| record.version > self.read_version)
                .any(|record| record.writes.iter().any(|w| reads.iter().any(|r| r.intersects(w))));
            if conflicted {
                debug!(read_version = self.read_version, "commit rejected by read conflict");
                return Err(KvError::NotCommitted);
            }
        }

        let data = Arc::make_mut(&mut state.data);
        for mutation in &mutations {
            mutation.apply(data);
        }

        state.version += 1;
        let version = state.version;
        state.commits.push_back(CommitRecord { version, writes });
        while state.commits.len() > self.shared.log_capacity {
            if let Some(evicted) = state.commits.pop_front() {
                state.oldest_version = evicted.version;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(value: &[u8]) -> i64 {
        let mut raw = [0u8; 8];
        raw[..value.len()].copy_from_slice(value);
        i64::from_le_bytes(raw)
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let db = MemoryDatabase::new();
        let tr = db.create_transaction().unwrap();

        tr.set(b"a", b"1");
        tr.set(b"b", b"2");
        tr.clear(b"a");

        assert_eq!(tr.get(b"a", false).await.unwrap(), None);
        assert_eq!(tr.get(b"b", false).await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(db.read(b"b"), None);

        tr.commit().await.unwrap();
        assert_eq!(db.read(b"b"), Some(b"2".to_vec()));
        assert_eq!(db.committed_version(), 1);
    }

    #[tokio::test]
    async fn test_range_limit_and_reverse() {
        let db = MemoryDatabase::new();
        let tr = db.create_transaction().unwrap();
        for key in [b"a", b"b", b"c", b"d"] {
            tr.set(key, b"");
        }

        let forward = tr.get_range(b"a", b"d", RangeOptions::limit(2), true).await.unwrap();
        assert_eq!(forward.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>(), vec![b"a".to_vec(), b"b".to_vec()]);

        let backward = tr.get_range(b"a", b"e", RangeOptions::limit(1).reversed(), true).await.unwrap();
        assert_eq!(backward[0].key, b"d".to_vec());

        let all = tr.get_range(b"b", b"z", RangeOptions::default(), true).await.unwrap();
        assert_eq!(all.len(), 3);

        assert!(tr.get_range(b"b", b"a", RangeOptions::default(), true).await.is_err());
        assert!(tr.get_range(b"b", b"b", RangeOptions::default(), true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_range() {
        let db = MemoryDatabase::new();
        let tr = db.create_transaction().unwrap();
        for key in [b"a1", b"a2", b"b1"] {
            tr.set(key, b"x");
        }
        tr.clear_range(b"a", b"b");
        tr.commit().await.unwrap();

        let keys: Vec<Vec<u8>> = db.dump().into_iter().map(|kv| kv.key).collect();
        assert_eq!(keys, vec![b"b1".to_vec()]);
    }

    #[tokio::test]
    async fn test_read_write_conflict() {
        let db = MemoryDatabase::new();
        let t1 = db.create_transaction().unwrap();
        let t2 = db.create_transaction().unwrap();

        assert_eq!(t1.get(b"k", false).await.unwrap(), None);
        t1.set(b"other", b"1");

        t2.set(b"k", b"2");
        t2.commit().await.unwrap();

        assert_eq!(t1.commit().await, Err(KvError::NotCommitted));
        assert_eq!(db.read(b"other"), None);
    }

    #[tokio::test]
    async fn test_snapshot_read_does_not_conflict() {
        let db = MemoryDatabase::new();
        let t1 = db.create_transaction().unwrap();
        let t2 = db.create_transaction().unwrap();

        t1.get(b"k", true).await.unwrap();
        t1.set(b"other", b"1");

        t2.set(b"k", b"2");
        t2.commit().await.unwrap();

        t1.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_suppressed_write_does_not_conflict() {
        let db = MemoryDatabase::new();
        let t1 = db.create_transaction().unwrap();
        let t2 = db.create_transaction().unwrap();

        t1.get(b"k", false).await.unwrap();
        t1.set(b"other", b"1");

        t2.set_next_write_no_write_conflict_range();
        t2.set(b"k", b"2");
        // The flag covers one write only.
        t2.set(b"j", b"3");
        t2.commit().await.unwrap();

        t1.commit().await.unwrap();
        assert_eq!(db.read(b"k"), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_write_conflict_key() {
        let db = MemoryDatabase::new();
        let t1 = db.create_transaction().unwrap();
        let t2 = db.create_transaction().unwrap();

        t1.get(b"k", false).await.unwrap();
        t1.set(b"other", b"1");

        t2.add_write_conflict_key(b"k");
        t2.set(b"unrelated", b"2");
        t2.commit().await.unwrap();

        assert_eq!(t1.commit().await, Err(KvError::NotCommitted));
    }

    #[tokio::test]
    async fn test_limited_read_conflict_is_narrowed() {
        let db = MemoryDatabase::new();
        let setup = db.create_transaction().unwrap();
        setup.set(b"a", b"");
        setup.set(b"m", b"");
        setup.commit().await.unwrap();

        let t1 = db.create_transaction().unwrap();
        let first = t1.get_range(b"a", b"z", RangeOptions::limit(1), false).await.unwrap();
        assert_eq!(first[0].key, b"a".to_vec());
        t1.set(b"out", b"");

        let t2 = db.create_transaction().unwrap();
        t2.set(b"q", b"");
        t2.commit().await.unwrap();

        t1.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_atomic_add_merges_concurrent_increments() {
        let db = MemoryDatabase::new();
        let t1 = db.create_transaction().unwrap();
        let t2 = db.create_transaction().unwrap();

        t1.atomic_add(b"n", 1);
        t2.atomic_add(b"n", 5);
        t1.commit().await.unwrap();
        t2.commit().await.unwrap();

        assert_eq!(counter(&db.read(b"n").unwrap()), 6);
    }

    #[tokio::test]
    async fn test_atomic_add_visible_to_own_reads() {
        let db = MemoryDatabase::new();
        let tr = db.create_transaction().unwrap();
        tr.set(b"n", &[0x01]);
        tr.atomic_add(b"n", -3);
        assert_eq!(counter(&tr.get(b"n", true).await.unwrap().unwrap()), -2);
    }

    #[tokio::test]
    async fn test_size_limits_fail_at_commit() {
        let db = MemoryDatabase::new();
        let tr = db.create_transaction().unwrap();
        tr.set(&vec![0u8; MAX_KEY_SIZE + 1], b"");
        assert!(matches!(tr.commit().await, Err(KvError::KeyTooLarge { .. })));

        let tr = db.create_transaction().unwrap();
        tr.set(b"k", &vec![0u8; MAX_VALUE_SIZE + 1]);
        assert!(matches!(tr.commit().await, Err(KvError::ValueTooLarge { .. })));
        assert!(db.dump().is_empty());
    }

    #[tokio::test]
    async fn test_use_after_commit() {
        let db = MemoryDatabase::new();
        let tr = db.create_transaction().unwrap();
        tr.commit().await.unwrap();
        assert_eq!(tr.get(b"k", false).await, Err(KvError::AlreadyCommitted));
        assert_eq!(tr.commit().await, Err(KvError::AlreadyCommitted));
    }

    #[tokio::test]
    async fn test_transaction_too_old() {
        let db = MemoryDatabase::with_commit_log_capacity(2);
        let old = db.create_transaction().unwrap();
        old.get(b"k", false).await.unwrap();
        old.set(b"x", b"");

        for i in 0..3u8 {
            let tr = db.create_transaction().unwrap();
            tr.set(&[b'w', i], b"");
            tr.commit().await.unwrap();
        }

        let err = old.commit().await.unwrap_err();
        assert!(matches!(err, KvError::TransactionTooOld { read_version: 0, .. }));
        assert!(err.is_retryable());
    }
}
