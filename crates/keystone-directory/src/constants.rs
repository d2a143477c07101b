//! Persisted layout constants and resource bounds for the directory layer.
//!
//! The byte values here are shared with every other client of the same
//! database. Changing any of them makes existing directory trees unreadable.

use crate::version::DirectoryVersion;

// ============================================================================
// Persisted layout
// ============================================================================

/// Default prefix of the node (metadata) subspace.
///
/// `0xFE` is not a valid tuple type code, so node keys never collide with
/// tuple-encoded user keys.
pub const DEFAULT_NODE_PREFIX: u8 = 0xFE;

/// Key element under the root node holding the allocator state.
pub const HCA_PREFIX: &[u8] = b"hca";

/// Key element under the root node holding the layout version.
pub const VERSION_KEY: &[u8] = b"version";

/// Key element under each node holding its layer identifier.
pub const LAYER_KEY: &[u8] = b"layer";

/// Layer identifier that marks a directory partition.
pub const PARTITION_LAYER: &[u8] = b"partition";

/// First key element of a node's child entries: `[SUBDIRS_KEY, name] -> prefix`.
pub const SUBDIRS_KEY: i64 = 0;

/// Allocator subspace element for window counters.
pub const HCA_COUNTERS_KEY: i64 = 0;

/// Allocator subspace element for claimed candidates.
pub const HCA_RECENT_KEY: i64 = 1;

/// Layout version written by this implementation.
pub const EXPECTED_VERSION: DirectoryVersion = DirectoryVersion::new(1, 0, 0);

// ============================================================================
// Allocator windows
// ============================================================================

/// Window size while the window start is below [`HCA_MEDIUM_WINDOW_THRESHOLD`].
pub const HCA_SMALL_WINDOW_SIZE: i64 = 64;

/// Window size while the window start is below [`HCA_LARGE_WINDOW_THRESHOLD`].
pub const HCA_MEDIUM_WINDOW_SIZE: i64 = 1024;

/// Window size for every later window.
pub const HCA_LARGE_WINDOW_SIZE: i64 = 8192;

/// Window start at which windows grow to [`HCA_MEDIUM_WINDOW_SIZE`].
pub const HCA_MEDIUM_WINDOW_THRESHOLD: i64 = 255;

/// Window start at which windows grow to [`HCA_LARGE_WINDOW_SIZE`].
pub const HCA_LARGE_WINDOW_THRESHOLD: i64 = 65535;

// ============================================================================
// Resource bounds
// ============================================================================

/// Maximum number of components in a directory path.
///
/// Bounds the recursion of create, remove and partition delegation.
pub const MAX_DIRECTORY_DEPTH: usize = 128;

/// Maximum length of one path component, in bytes.
pub const MAX_PATH_COMPONENT_LENGTH: usize = 1024;

/// Child entries fetched per range read when listing a directory.
pub const LIST_PAGE_SIZE: usize = 128;

// Windows only grow.
const _: () = assert!(HCA_SMALL_WINDOW_SIZE > 0);
const _: () = assert!(HCA_SMALL_WINDOW_SIZE < HCA_MEDIUM_WINDOW_SIZE);
const _: () = assert!(HCA_MEDIUM_WINDOW_SIZE < HCA_LARGE_WINDOW_SIZE);
const _: () = assert!(HCA_MEDIUM_WINDOW_THRESHOLD < HCA_LARGE_WINDOW_THRESHOLD);

const _: () = assert!(MAX_DIRECTORY_DEPTH > 0);
const _: () = assert!(MAX_PATH_COMPONENT_LENGTH > 0);
const _: () = assert!(LIST_PAGE_SIZE > 0);
