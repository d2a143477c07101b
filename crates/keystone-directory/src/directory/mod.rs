//! Hierarchical directories mapped onto short key prefixes.
//!
//! A [`DirectoryLayer`] stores a tree of named directories in a node
//! subspace and hands each directory a unique content prefix from a
//! [`HighContentionAllocator`](crate::HighContentionAllocator). Opening a
//! directory yields a [`Directory`] handle whose content subspace is where
//! applications keep their data. Moving a directory only rewrites metadata;
//! its contents keep their prefix.
//!
//! Partitions are directories with their own embedded directory layer. Their
//! descendants are allocated inside the partition's prefix, and nothing may
//! be moved across a partition boundary.

mod handle;
mod layer;
mod node;
pub mod validation;

pub use handle::Directory;
pub use layer::DirectoryLayer;
pub use layer::DirectoryLayerOptions;

use keystone_kv::KvError;
use keystone_kv::TransactError;
use keystone_layer::SubspaceError;
use snafu::Snafu;

use crate::allocator::AllocationError;
use crate::version::DirectoryVersion;

/// Render a path for messages and logs.
pub(crate) fn display_path(path: &[String]) -> String {
    format!("/{}", path.join("/"))
}

/// Errors from directory operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DirectoryError {
    /// The root directory cannot be opened, created, moved or removed.
    #[snafu(display("cannot {operation} the root directory"))]
    RootOperation {
        /// The rejected operation.
        operation: &'static str,
    },

    /// No directory exists at the path.
    #[snafu(display("directory does not exist: {}", display_path(path)))]
    NotFound {
        /// The missing path.
        path: Vec<String>,
    },

    /// A directory already exists at the path.
    #[snafu(display("directory already exists: {}", display_path(path)))]
    AlreadyExists {
        /// The occupied path.
        path: Vec<String>,
    },

    /// The parent of a move destination does not exist.
    #[snafu(display("parent directory of {} does not exist", display_path(path)))]
    ParentNotFound {
        /// The move destination.
        path: Vec<String>,
    },

    /// The directory was created with a different layer.
    #[snafu(display(
        "directory {} was created with layer {:?}, not {:?}",
        display_path(path),
        String::from_utf8_lossy(actual),
        String::from_utf8_lossy(expected)
    ))]
    LayerMismatch {
        /// The directory path.
        path: Vec<String>,
        /// The layer the caller asked for.
        expected: Vec<u8>,
        /// The layer stored with the directory.
        actual: Vec<u8>,
    },

    /// A partition was opened with a layer other than the partition layer.
    #[snafu(display("directory partition {} cannot be opened with a layer", display_path(path)))]
    PartitionLayer {
        /// The partition path.
        path: Vec<String>,
    },

    /// A directory cannot be moved inside itself.
    #[snafu(display(
        "cannot move {} inside itself to {}",
        display_path(old_path),
        display_path(new_path)
    ))]
    MoveCycle {
        /// The directory being moved.
        old_path: Vec<String>,
        /// The rejected destination.
        new_path: Vec<String>,
    },

    /// Source and destination are in different partitions.
    #[snafu(display(
        "cannot move {} to {} across a partition boundary",
        display_path(old_path),
        display_path(new_path)
    ))]
    CrossPartitionMove {
        /// The directory being moved.
        old_path: Vec<String>,
        /// The rejected destination.
        new_path: Vec<String>,
    },

    /// A manual prefix was given to a layer that does not accept them.
    #[snafu(display("manual prefixes are not allowed here (creating {})", display_path(path)))]
    ManualPrefixNotAllowed {
        /// The path being created.
        path: Vec<String>,
    },

    /// A manual prefix overlaps an existing directory or the metadata.
    #[snafu(display("prefix {} is already in use", hex::encode(prefix)))]
    PrefixInUse {
        /// The rejected prefix.
        prefix: Vec<u8>,
    },

    /// An allocated prefix already holds data written outside the layer.
    #[snafu(display("allocated prefix {} already holds keys", hex::encode(prefix)))]
    AllocatorPrefixNotEmpty {
        /// The allocated prefix.
        prefix: Vec<u8>,
    },

    /// An allocated prefix overlaps another directory's prefix.
    #[snafu(display("allocated prefix {} is already in use", hex::encode(prefix)))]
    AllocatorPrefixInUse {
        /// The allocated prefix.
        prefix: Vec<u8>,
    },

    /// Partitions have no content subspace of their own.
    #[snafu(display("directory partition {} cannot be used as a subspace", display_path(path)))]
    PartitionSubspace {
        /// The partition path.
        path: Vec<String>,
    },

    /// The stored layout has a newer major version.
    #[snafu(display("directory layout version {stored} is not supported (expected {expected})"))]
    IncompatibleVersion {
        /// The stored version.
        stored: DirectoryVersion,
        /// The supported version.
        expected: DirectoryVersion,
    },

    /// The stored layout has a newer minor version and cannot be written.
    #[snafu(display("directory layout version {stored} is read-only (expected {expected})"))]
    ReadOnlyVersion {
        /// The stored version.
        stored: DirectoryVersion,
        /// The supported version.
        expected: DirectoryVersion,
    },

    /// A path component is unusable.
    #[snafu(display("invalid path component {component:?}: {reason}"))]
    InvalidPath {
        /// The rejected component.
        component: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The path has too many components.
    #[snafu(display("path depth {depth} exceeds maximum {max}"))]
    PathTooDeep {
        /// Components in the path.
        depth: usize,
        /// Allowed components.
        max: usize,
    },

    /// Directory metadata could not be decoded.
    #[snafu(display("corrupted directory metadata at {}: {reason}", display_path(path)))]
    CorruptedMetadata {
        /// The directory being read.
        path: Vec<String>,
        /// What was wrong.
        reason: String,
    },

    /// Prefix allocation failed.
    #[snafu(display("prefix allocation failed: {source}"))]
    AllocationFailed {
        /// The allocator error.
        source: AllocationError,
    },

    /// A metadata key or value could not be encoded or decoded.
    #[snafu(display("directory metadata encoding error: {source}"))]
    Subspace {
        /// The underlying subspace error.
        source: SubspaceError,
    },

    /// The store rejected a read or the attempt.
    #[snafu(display("directory storage error: {source}"))]
    Storage {
        /// The underlying store error.
        source: KvError,
    },
}

impl From<KvError> for DirectoryError {
    fn from(source: KvError) -> Self {
        DirectoryError::Storage { source }
    }
}

impl TransactError for DirectoryError {
    fn is_retryable(&self) -> bool {
        match self {
            DirectoryError::Storage { source } => source.is_retryable(),
            DirectoryError::AllocationFailed { source } => source.is_retryable(),
            _ => false,
        }
    }
}
