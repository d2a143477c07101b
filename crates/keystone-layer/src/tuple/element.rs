use std::cmp::Ordering;

use uuid::Uuid;

use super::TupleError;
use super::encoding::encode_element;
use super::tuple_type::Tuple;

// =============================================================================
// Element Type
// =============================================================================

/// A single element within a tuple.
///
/// Equality and ordering are defined by the packed encoding: two elements are
/// equal when they encode to the same bytes, and sort the way their bytes
/// sort. Floats therefore compare by bit pattern (`-0.0 < 0.0`, and a NaN
/// equals itself).
#[derive(Debug, Clone)]
pub enum Element {
    /// Null value (sorts first).
    Null,

    /// Byte string.
    Bytes(Vec<u8>),

    /// UTF-8 string.
    String(String),

    /// Nested tuple.
    Nested(Tuple),

    /// Signed 64-bit integer.
    Int(i64),

    /// 32-bit floating point.
    Float(f32),

    /// 64-bit floating point.
    Double(f64),

    /// Boolean value.
    Bool(bool),

    /// 128-bit UUID.
    Uuid(Uuid),
}

impl Element {
    /// Pack this element into a fresh buffer.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.pack_into(&mut buf);
        buf
    }

    /// Pack this element into an existing buffer.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        encode_element(self, buf);
    }

    /// Returns the integer value, if this is an integer element.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Element::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is a byte string element.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Element::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the nested tuple, if this is a nested element.
    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Element::Nested(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true for [`Element::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Element::Null)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Element {}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pack().cmp(&other.pack())
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<()> for Element {
    fn from(_: ()) -> Self {
        Element::Null
    }
}

impl From<Vec<u8>> for Element {
    fn from(v: Vec<u8>) -> Self {
        Element::Bytes(v)
    }
}

impl From<&[u8]> for Element {
    fn from(v: &[u8]) -> Self {
        Element::Bytes(v.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Element {
    fn from(v: &[u8; N]) -> Self {
        Element::Bytes(v.to_vec())
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Element::String(s)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element::String(s.to_string())
    }
}

impl From<&String> for Element {
    fn from(s: &String) -> Self {
        Element::String(s.clone())
    }
}

impl From<i64> for Element {
    fn from(n: i64) -> Self {
        Element::Int(n)
    }
}

impl From<i32> for Element {
    fn from(n: i32) -> Self {
        Element::Int(i64::from(n))
    }
}

impl From<u32> for Element {
    fn from(n: u32) -> Self {
        Element::Int(i64::from(n))
    }
}

impl From<u8> for Element {
    fn from(n: u8) -> Self {
        Element::Int(i64::from(n))
    }
}

impl TryFrom<u64> for Element {
    type Error = TupleError;

    /// Fails for values above `i64::MAX` rather than wrapping or truncating.
    fn try_from(n: u64) -> Result<Self, Self::Error> {
        i64::try_from(n)
            .map(Element::Int)
            .map_err(|_| TupleError::IntegerOutOfRange { value: n })
    }
}

impl From<bool> for Element {
    fn from(b: bool) -> Self {
        Element::Bool(b)
    }
}

impl From<f32> for Element {
    fn from(f: f32) -> Self {
        Element::Float(f)
    }
}

impl From<f64> for Element {
    fn from(f: f64) -> Self {
        Element::Double(f)
    }
}

impl From<Uuid> for Element {
    fn from(u: Uuid) -> Self {
        Element::Uuid(u)
    }
}

impl From<Tuple> for Element {
    fn from(t: Tuple) -> Self {
        Element::Nested(t)
    }
}
