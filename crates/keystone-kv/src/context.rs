//! Per-attempt transaction context and the transaction runner.
//!
//! Every operation that touches the store accepts a [`Transactor`]: either a
//! [`Database`], which runs the body in fresh attempts and retries transient
//! failures, or a [`TransactionContext`], which runs the body inline as part
//! of a transaction the caller already owns and will commit itself.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tracing::debug;
use tracing::warn;

use crate::error::KvError;
use crate::transaction::Database;
use crate::transaction::Transaction;

/// One attempt of a transaction, shared by every sub-operation in it.
///
/// Cloning is cheap; clones refer to the same transaction. The context also
/// owns a critical-section lock that callers use to serialize
/// read-modify-write steps issued concurrently against the same transaction.
/// The lock lives exactly as long as the attempt.
pub struct TransactionContext<T> {
    inner: Arc<ContextInner<T>>,
}

struct ContextInner<T> {
    transaction: T,
    exclusive: Mutex<()>,
}

impl<T> Clone for TransactionContext<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transaction> TransactionContext<T> {
    /// Wrap a freshly created transaction.
    pub fn new(transaction: T) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                transaction,
                exclusive: Mutex::new(()),
            }),
        }
    }

    /// The underlying transaction.
    pub fn transaction(&self) -> &T {
        &self.inner.transaction
    }

    /// Enter the critical section of this attempt.
    ///
    /// Held across awaits; released when the guard drops.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.inner.exclusive.lock().await
    }
}

impl<T> Deref for TransactionContext<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.transaction
    }
}

/// Errors a transaction body may return.
///
/// The runner converts store failures into the body's error type and asks
/// the error whether another attempt could succeed.
pub trait TransactError: From<KvError> + Send + 'static {
    /// Returns true when the whole body should be retried in a fresh attempt.
    fn is_retryable(&self) -> bool;
}

impl TransactError for KvError {
    fn is_retryable(&self) -> bool {
        KvError::is_retryable(self)
    }
}

/// Something a transaction body can run against.
#[async_trait]
pub trait Transactor: Send + Sync {
    /// Transaction type handed to the body.
    type Transaction: Transaction;

    /// Run `body` inside a transaction.
    ///
    /// For a database the body may run several times, once per attempt, and
    /// the attempt is committed when the body succeeds. For a transaction
    /// context it runs exactly once and nothing is committed.
    async fn transact<F, Fut, R, E>(&self, body: F) -> Result<R, E>
    where
        F: FnMut(TransactionContext<Self::Transaction>) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: TransactError;
}

#[async_trait]
impl<D: Database> Transactor for D {
    type Transaction = D::Transaction;

    async fn transact<F, Fut, R, E>(&self, mut body: F) -> Result<R, E>
    where
        F: FnMut(TransactionContext<Self::Transaction>) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: TransactError,
    {
        let policy = self.retry_policy();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let context = TransactionContext::new(self.create_transaction()?);

            let outcome = match body(context.clone()).await {
                Ok(value) => context.commit().await.map(|()| value).map_err(E::from),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "transaction attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(attempts = attempt, "transaction retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<T: Transaction> Transactor for TransactionContext<T> {
    type Transaction = T;

    async fn transact<F, Fut, R, E>(&self, mut body: F) -> Result<R, E>
    where
        F: FnMut(TransactionContext<Self::Transaction>) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: TransactError,
    {
        body(self.clone()).await
    }
}
