//! Pure functions for allocator windows and the version gate.
//!
//! No I/O and no store access. The allocator and directory layer call these
//! from their imperative shells, which keeps the decisions testable on their
//! own.

use crate::constants::HCA_LARGE_WINDOW_SIZE;
use crate::constants::HCA_LARGE_WINDOW_THRESHOLD;
use crate::constants::HCA_MEDIUM_WINDOW_SIZE;
use crate::constants::HCA_MEDIUM_WINDOW_THRESHOLD;
use crate::constants::HCA_SMALL_WINDOW_SIZE;
use crate::version::DirectoryVersion;

/// Size of the allocation window starting at `start`.
///
/// Small windows keep early prefixes short; larger windows bound the number
/// of window advances once many prefixes exist.
#[inline]
pub fn window_size(start: i64) -> i64 {
    if start < HCA_MEDIUM_WINDOW_THRESHOLD {
        HCA_SMALL_WINDOW_SIZE
    } else if start < HCA_LARGE_WINDOW_THRESHOLD {
        HCA_MEDIUM_WINDOW_SIZE
    } else {
        HCA_LARGE_WINDOW_SIZE
    }
}

/// Returns true while fewer than half of a window's slots have been handed out.
#[inline]
pub fn window_has_room(count: i64, window: i64) -> bool {
    count.saturating_mul(2) < window
}

/// Outcome of comparing a stored layout version with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// No version is stored yet.
    Missing,
    /// The layout can be used for the requested access.
    Compatible,
    /// The stored major version is newer; the layout cannot be read.
    Incompatible,
    /// The stored minor version is newer; the layout is read-only.
    ReadOnly,
}

/// Decide whether a layout at `stored` may be used with `write_access`.
pub fn check_version(stored: Option<DirectoryVersion>, expected: DirectoryVersion, write_access: bool) -> VersionCheck {
    match stored {
        None => VersionCheck::Missing,
        Some(v) if v.major > expected.major => VersionCheck::Incompatible,
        Some(v) if v.minor > expected.minor && write_access => VersionCheck::ReadOnly,
        Some(_) => VersionCheck::Compatible,
    }
}

/// Returns true if `path` equals `prefix` or lies below it.
#[inline]
pub fn path_starts_with(path: &[String], prefix: &[String]) -> bool {
    path.len() >= prefix.len() && path.iter().zip(prefix).all(|(a, b)| a == b)
}
