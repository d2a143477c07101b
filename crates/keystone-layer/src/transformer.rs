//! Key and value transformers.
//!
//! A [`Transformer`] converts between a logical item and the bytes stored in
//! the database. Subspaces carry one transformer for keys and one for values.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::OptionExt;
use snafu::ResultExt;

use crate::error::InvalidLengthSnafu;
use crate::error::InvalidUtf8Snafu;
use crate::error::JsonSnafu;
use crate::error::SubspaceError;
use crate::error::TupleSnafu;
use crate::range::KeyRange;
use crate::tuple::Tuple;

/// Converts logical items to and from their stored byte form.
///
/// Implementations must satisfy `unpack(pack(x)) == x` for every valid `x`.
pub trait Transformer: Clone + Send + Sync + 'static {
    /// The logical type.
    type Item;

    /// Encode an item.
    fn pack(&self, item: &Self::Item) -> Result<Vec<u8>, SubspaceError>;

    /// Decode an item.
    fn unpack(&self, data: &[u8]) -> Result<Self::Item, SubspaceError>;

    /// Range of encoded keys "under" `item`, if the encoding defines one.
    ///
    /// Subspaces fall back to `[pack ++ 0x00, pack ++ 0xFF)` when this is `None`.
    fn range(&self, _item: &Self::Item) -> Result<Option<KeyRange>, SubspaceError> {
        Ok(None)
    }
}

// =============================================================================
// Tuple
// =============================================================================

/// Tuple-encoded keys or values. Decoding is strict, so element types
/// survive a round trip unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleEncoding;

impl Transformer for TupleEncoding {
    type Item = Tuple;

    fn pack(&self, item: &Tuple) -> Result<Vec<u8>, SubspaceError> {
        Ok(item.pack())
    }

    fn unpack(&self, data: &[u8]) -> Result<Tuple, SubspaceError> {
        Tuple::unpack_strict(data).context(TupleSnafu)
    }

    fn range(&self, item: &Tuple) -> Result<Option<KeyRange>, SubspaceError> {
        Ok(Some(item.range()))
    }
}

// =============================================================================
// Raw bytes
// =============================================================================

/// Bytes stored verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoding;

impl Transformer for RawEncoding {
    type Item = Vec<u8>;

    fn pack(&self, item: &Vec<u8>) -> Result<Vec<u8>, SubspaceError> {
        Ok(item.clone())
    }

    fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, SubspaceError> {
        Ok(data.to_vec())
    }
}

// =============================================================================
// Strings and integers
// =============================================================================

/// UTF-8 strings stored without framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringEncoding;

impl Transformer for StringEncoding {
    type Item = String;

    fn pack(&self, item: &String) -> Result<Vec<u8>, SubspaceError> {
        Ok(item.as_bytes().to_vec())
    }

    fn unpack(&self, data: &[u8]) -> Result<String, SubspaceError> {
        String::from_utf8(data.to_vec())
            .map_err(|e| e.utf8_error())
            .context(InvalidUtf8Snafu)
    }
}

/// 32-bit signed integers, big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int32BeEncoding;

impl Transformer for Int32BeEncoding {
    type Item = i32;

    fn pack(&self, item: &i32) -> Result<Vec<u8>, SubspaceError> {
        Ok(item.to_be_bytes().to_vec())
    }

    fn unpack(&self, data: &[u8]) -> Result<i32, SubspaceError> {
        let raw = <[u8; 4]>::try_from(data).ok().context(InvalidLengthSnafu {
            expected: 4usize,
            actual: data.len(),
        })?;
        Ok(i32::from_be_bytes(raw))
    }
}

/// 64-bit little-endian counters, the operand format of atomic add.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterEncoding;

impl Transformer for CounterEncoding {
    type Item = i64;

    fn pack(&self, item: &i64) -> Result<Vec<u8>, SubspaceError> {
        Ok(item.to_le_bytes().to_vec())
    }

    /// Shorter values are zero-extended, matching how the store applies
    /// atomic adds to short operands.
    fn unpack(&self, data: &[u8]) -> Result<i64, SubspaceError> {
        if data.len() > 8 {
            return InvalidLengthSnafu {
                expected: 8usize,
                actual: data.len(),
            }
            .fail();
        }
        let mut raw = [0u8; 8];
        raw[..data.len()].copy_from_slice(data);
        Ok(i64::from_le_bytes(raw))
    }
}

/// Empty values, for keys that only mark presence.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidEncoding;

impl Transformer for VoidEncoding {
    type Item = ();

    fn pack(&self, _item: &()) -> Result<Vec<u8>, SubspaceError> {
        Ok(Vec::new())
    }

    fn unpack(&self, _data: &[u8]) -> Result<(), SubspaceError> {
        Ok(())
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Values serialized as JSON with `serde_json`.
pub struct JsonEncoding<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonEncoding<T> {
    /// Create a JSON transformer for `T`.
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for JsonEncoding<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonEncoding<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonEncoding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonEncoding<{}>", std::any::type_name::<T>())
    }
}

impl<T> Transformer for JsonEncoding<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    type Item = T;

    fn pack(&self, item: &T) -> Result<Vec<u8>, SubspaceError> {
        serde_json::to_vec(item).context(JsonSnafu)
    }

    fn unpack(&self, data: &[u8]) -> Result<T, SubspaceError> {
        serde_json::from_slice(data).context(JsonSnafu)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[test]
    fn test_tuple_encoding_range_is_terminator_aware() {
        let t = Tuple::new().push("a");
        let range = TupleEncoding.range(&t).unwrap().unwrap();
        assert_eq!(range, t.range());
    }

    #[test]
    fn test_raw_encoding_has_no_range_hook() {
        assert!(RawEncoding.range(&vec![1, 2]).unwrap().is_none());
    }

    #[test]
    fn test_int32_be() {
        let bytes = Int32BeEncoding.pack(&-2).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(Int32BeEncoding.unpack(&bytes).unwrap(), -2);
        assert!(Int32BeEncoding.unpack(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_counter_little_endian() {
        assert_eq!(CounterEncoding.pack(&1).unwrap(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(CounterEncoding.unpack(&[0x01, 0x01]).unwrap(), 257);
        assert_eq!(CounterEncoding.unpack(&[]).unwrap(), 0);
        assert!(CounterEncoding.unpack(&[0; 9]).is_err());
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        assert_eq!(StringEncoding.unpack(b"hi").unwrap(), "hi");
        assert!(matches!(StringEncoding.unpack(&[0xFF]), Err(SubspaceError::InvalidUtf8 { .. })));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        age: u32,
    }

    #[test]
    fn test_json_encoding() {
        let xf = JsonEncoding::<Profile>::new();
        let profile = Profile {
            name: "ada".into(),
            age: 36,
        };
        let bytes = xf.pack(&profile).unwrap();
        assert_eq!(bytes, br#"{"name":"ada","age":36}"#.to_vec());
        assert_eq!(xf.unpack(&bytes).unwrap(), profile);
        assert!(matches!(xf.unpack(b"{"), Err(SubspaceError::Json { .. })));
    }
}
