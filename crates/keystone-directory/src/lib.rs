//! Hierarchical directories over a transactional ordered key-value store.
//!
//! - [`HighContentionAllocator`]: short unique prefixes, allocated with few
//!   conflicts between concurrent transactions
//! - [`DirectoryLayer`]: a tree of named directories, each mapped to its own
//!   prefix, with partitions and a persisted layout version
//! - [`Directory`]: a handle to an opened directory
//!
//! # Example
//!
//! ```
//! use keystone_directory::DirectoryLayer;
//! use keystone_kv::MemoryDatabase;
//! use keystone_layer::Tuple;
//!
//! # tokio_test_block_on(async {
//! let db = MemoryDatabase::new();
//! let directories = DirectoryLayer::default();
//!
//! let users = directories.create_or_open(&db, &["app", "users"], None).await?;
//! let key = users.subspace()?.pack(&Tuple::new().push("alice"));
//! assert!(key.starts_with(users.prefix()));
//!
//! assert_eq!(directories.list_all(&db, &["app"]).await?, vec!["users".to_string()]);
//! # Ok::<_, keystone_directory::DirectoryError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod allocator;
pub mod constants;
pub mod directory;
pub mod verified;
pub mod version;

pub use allocator::AllocationError;
pub use allocator::AllocatorWindow;
pub use allocator::HighContentionAllocator;
pub use directory::Directory;
pub use directory::DirectoryError;
pub use directory::DirectoryLayer;
pub use directory::DirectoryLayerOptions;
pub use version::DirectoryVersion;
pub use version::VersionEncoding;
