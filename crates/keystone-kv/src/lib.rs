//! Transactional key-value primitives.
//!
//! - [`Transaction`] / [`Database`]: the optimistic ordered store the
//!   directory layer runs on
//! - [`TransactionContext`]: one attempt of a transaction, shared by its
//!   concurrent sub-operations
//! - [`Transactor`]: runs a body against a database (with retries) or an
//!   existing transaction (inline)
//! - [`MemoryDatabase`]: an in-memory store for tests and embedding

pub mod context;
pub mod error;
pub mod inmemory;
pub mod retry;
pub mod transaction;

pub use context::TransactError;
pub use context::TransactionContext;
pub use context::Transactor;
pub use error::KvError;
pub use inmemory::MemoryDatabase;
pub use inmemory::MemoryTransaction;
pub use retry::RetryPolicy;
pub use transaction::Database;
pub use transaction::KeyValue;
pub use transaction::RangeOptions;
pub use transaction::Transaction;
