//! Key ranges and the `strinc` successor operation.

use std::fmt;

use snafu::Snafu;

/// A half-open key range `[begin, end)`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub begin: Vec<u8>,
    /// Exclusive upper bound.
    pub end: Vec<u8>,
}

/// `strinc` was given a key with no successor prefix.
#[derive(Debug, Snafu)]
#[snafu(display("key {} has no prefix successor (empty or all 0xFF)", hex::encode(key)))]
pub struct StrincError {
    /// The offending key.
    pub key: Vec<u8>,
}

impl KeyRange {
    /// Create a range from explicit bounds.
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// All keys that start with `prefix`: `[prefix, strinc(prefix))`.
    ///
    /// An empty prefix (or one made only of `0xFF` bytes) selects everything
    /// from `prefix` up to the `0xFF` system boundary.
    pub fn starts_with(prefix: &[u8]) -> Self {
        let end = strinc(prefix).unwrap_or_else(|_| vec![0xFF]);
        Self {
            begin: prefix.to_vec(),
            end,
        }
    }

    /// Keys that extend an encoded key by at least one byte:
    /// `[key ++ 0x00, key ++ 0xFF)`.
    pub fn tuple_children(key: Vec<u8>) -> Self {
        let mut begin = key;
        let mut end = begin.clone();
        begin.push(0x00);
        end.push(0xFF);
        Self { begin, end }
    }

    /// Returns true if `key` lies in `[begin, end)`.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }

    /// Returns true if the range selects no keys.
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

impl fmt::Debug for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", hex::encode(&self.begin), hex::encode(&self.end))
    }
}

/// Smallest key greater than every key that starts with `key`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented.
///
/// # Errors
///
/// Returns [`StrincError`] when `key` is empty or consists only of `0xFF`.
pub fn strinc(key: &[u8]) -> Result<Vec<u8>, StrincError> {
    match key.iter().rposition(|&b| b != 0xFF) {
        Some(last) => {
            let mut out = key[..=last].to_vec();
            out[last] += 1;
            Ok(out)
        }
        None => Err(StrincError { key: key.to_vec() }),
    }
}
