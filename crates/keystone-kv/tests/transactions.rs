//! Serializability of the in-memory store under concurrent retrying writers.

use std::sync::Arc;

use futures::future::join_all;
use keystone_kv::Database;
use keystone_kv::KvError;
use keystone_kv::MemoryDatabase;
use keystone_kv::RangeOptions;
use keystone_kv::RetryPolicy;
use keystone_kv::Transaction;
use keystone_kv::TransactionContext;
use keystone_kv::Transactor;

fn decode(value: Option<Vec<u8>>) -> u64 {
    value
        .map(|v| u64::from_be_bytes(v.try_into().expect("8-byte counter")))
        .unwrap_or(0)
}

async fn increment(db: Arc<MemoryDatabase>) -> Result<(), KvError> {
    db.transact(|tr| async move {
        let current = decode(tr.get(b"counter", false).await?);
        tr.set(b"counter", &(current + 1).to_be_bytes());
        Ok::<_, KvError>(())
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_modify_write_is_serializable() {
    let db = MemoryDatabase::with_retry_policy(RetryPolicy {
        max_attempts: 1000,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
    });

    let tasks: Vec<_> = (0..32).map(|_| tokio::spawn(increment(Arc::clone(&db)))).collect();
    for task in join_all(tasks).await {
        task.expect("task panicked").expect("increment failed");
    }

    assert_eq!(decode(db.read(b"counter")), 32);
}

#[tokio::test]
async fn test_concurrent_reads_within_one_transaction() {
    let db = MemoryDatabase::new();
    db.transact(|tr| async move {
        for i in 0..10u8 {
            tr.set(&[b'k', i], &[i]);
        }
        Ok::<_, KvError>(())
    })
    .await
    .unwrap();

    let tr = TransactionContext::new(db.create_transaction().unwrap());
    let reads = (0..10u8).map(|i| {
        let tr = tr.clone();
        async move { tr.get(&[b'k', i], false).await }
    });
    let values: Vec<_> = join_all(reads).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, (0..10u8).map(|i| Some(vec![i])).collect::<Vec<_>>());

    let last = tr.get_range(b"k", b"l", RangeOptions::limit(1).reversed(), true).await.unwrap();
    assert_eq!(last[0].key, vec![b'k', 9]);
}

#[tokio::test]
async fn test_nested_transact_shares_the_outer_attempt() {
    let db = MemoryDatabase::new();

    db.transact(|tr| async move {
        tr.set(b"outer", b"1");
        // Running against the context joins the same attempt.
        tr.transact(|inner| async move {
            assert_eq!(inner.get(b"outer", false).await?, Some(b"1".to_vec()));
            inner.set(b"inner", b"2");
            Ok::<_, KvError>(())
        })
        .await?;
        Ok::<_, KvError>(())
    })
    .await
    .unwrap();

    assert_eq!(db.read(b"inner"), Some(b"2".to_vec()));
    assert_eq!(db.committed_version(), 1);
}
