//! Directory layout version and its stored encoding.

use std::fmt;

use keystone_layer::SubspaceError;
use keystone_layer::Transformer;

/// A `major.minor.patch` layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectoryVersion {
    /// Incompatible layout changes.
    pub major: u32,
    /// Additions older writers must not touch.
    pub minor: u32,
    /// Compatible fixes.
    pub patch: u32,
}

impl DirectoryVersion {
    /// Create a version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for DirectoryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Versions stored as three little-endian `u32` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionEncoding;

impl Transformer for VersionEncoding {
    type Item = DirectoryVersion;

    fn pack(&self, item: &DirectoryVersion) -> Result<Vec<u8>, SubspaceError> {
        let mut out = Vec::with_capacity(12);
        out.extend_from_slice(&item.major.to_le_bytes());
        out.extend_from_slice(&item.minor.to_le_bytes());
        out.extend_from_slice(&item.patch.to_le_bytes());
        Ok(out)
    }

    fn unpack(&self, data: &[u8]) -> Result<DirectoryVersion, SubspaceError> {
        let raw: &[u8; 12] = data.try_into().map_err(|_| SubspaceError::InvalidLength {
            expected: 12,
            actual: data.len(),
        })?;
        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Ok(DirectoryVersion::new(word(0), word(4), word(8)))
    }
}
