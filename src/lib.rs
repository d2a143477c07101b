//! Keystone: tuple-encoded keys, subspaces and a directory layer for
//! transactional ordered key-value stores.
//!
//! The workspace is split by concern:
//!
//! - [`layer`]: the order-preserving tuple codec, [`Subspace`] and value
//!   transformers
//! - [`kv`]: the transaction primitive, the retrying runner and an in-memory
//!   store
//! - [`directory`]: the high-contention allocator and the directory layer
//!
//! This crate re-exports all three and adds [`config`], which builds a
//! [`DirectoryLayer`] and a [`RetryPolicy`] from TOML and the environment.

pub mod config;

pub use keystone_directory as directory;
pub use keystone_kv as kv;
pub use keystone_layer as layer;

pub use config::ConfigError;
pub use config::DirectoryConfig;
pub use config::KeystoneConfig;
pub use keystone_directory::Directory;
pub use keystone_directory::DirectoryError;
pub use keystone_directory::DirectoryLayer;
pub use keystone_directory::DirectoryLayerOptions;
pub use keystone_directory::HighContentionAllocator;
pub use keystone_kv::Database;
pub use keystone_kv::MemoryDatabase;
pub use keystone_kv::RetryPolicy;
pub use keystone_kv::TransactionContext;
pub use keystone_kv::Transactor;
pub use keystone_layer::Element;
pub use keystone_layer::Subspace;
pub use keystone_layer::Tuple;
