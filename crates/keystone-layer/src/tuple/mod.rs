//! Order-preserving, type-tagged tuple encoding.
//!
//! Packed tuples sort byte-lexicographically in the same order as the
//! element sequences they encode, so they can be used directly as keys in an
//! ordered key-value store and scanned by prefix. The wire format is the one
//! defined by the [FoundationDB tuple layer](
//! https://github.com/apple/foundationdb/blob/main/design/tuple.md), so keys
//! written here are readable by other bindings sharing the same database.
//!
//! # Type Codes
//!
//! | Code | Type | Description |
//! |------|------|-------------|
//! | 0x00 | Null | Null value (escaped as `0x00 0xFF` inside a nested tuple) |
//! | 0x01 | Bytes | Byte string with null escaping |
//! | 0x02 | String | UTF-8 string with null escaping |
//! | 0x05 | Nested | Nested tuple, terminated by `0x00` |
//! | 0x0C-0x13 | NegInt | Negative integers (size = 0x14 - code) |
//! | 0x14 | IntZero | Integer zero |
//! | 0x15-0x1C | PosInt | Positive integers (size = code - 0x14) |
//! | 0x20 | Float | IEEE 754 single precision |
//! | 0x21 | Double | IEEE 754 double precision |
//! | 0x26 / 0x27 | Bool | False / true |
//! | 0x30 | Uuid | 16 raw bytes |
//!
//! Integers are limited to the `i64` range. The format reserves `0x0B` and
//! `0x1D` for arbitrary-precision integers; those are rejected on decode.
//!
//! # Decode Modes
//!
//! [`Tuple::unpack`] widens single floats to [`Element::Double`] and returns
//! UUIDs as 16-byte [`Element::Bytes`]. [`Tuple::unpack_strict`] keeps the
//! exact element types, so `unpack_strict(pack(t)) == t` for every tuple.
//!
//! # Example
//!
//! ```
//! use keystone_layer::Tuple;
//!
//! let tuple = Tuple::new().push("users").push(42i64).push("profile");
//!
//! let packed = tuple.pack();
//! let unpacked = Tuple::unpack_strict(&packed).unwrap();
//!
//! assert_eq!(tuple, unpacked);
//! ```

mod decoding;
mod element;
mod encoding;
mod tuple_type;

#[cfg(test)]
mod tests;

pub use element::Element;
use snafu::Snafu;
pub use tuple_type::Tuple;

// =============================================================================
// Type Codes
// =============================================================================

/// Null value type code.
const NULL_CODE: u8 = 0x00;

/// Byte string type code.
const BYTES_CODE: u8 = 0x01;

/// UTF-8 string type code.
const STRING_CODE: u8 = 0x02;

/// Nested tuple start type code.
const NESTED_CODE: u8 = 0x05;

/// Arbitrary-precision negative integer (unsupported).
const NEG_INT_ARBITRARY_CODE: u8 = 0x0B;

/// Smallest fixed-size negative integer code (8 byte magnitude).
const NEG_INT_MIN_CODE: u8 = 0x0C;

/// Integer zero type code (pivot point for integer encoding).
const INT_ZERO_CODE: u8 = 0x14;

/// Largest fixed-size positive integer code (8 byte magnitude).
const POS_INT_MAX_CODE: u8 = 0x1C;

/// Arbitrary-precision positive integer (unsupported).
const POS_INT_ARBITRARY_CODE: u8 = 0x1D;

/// 32-bit float type code.
const FLOAT_CODE: u8 = 0x20;

/// 64-bit double type code.
const DOUBLE_CODE: u8 = 0x21;

/// False boolean type code.
const FALSE_CODE: u8 = 0x26;

/// True boolean type code.
const TRUE_CODE: u8 = 0x27;

/// UUID type code.
const UUID_CODE: u8 = 0x30;

/// Second byte of the escape sequence for null bytes (`0x00 0xFF`).
const NULL_ESCAPE: u8 = 0xFF;

/// Largest magnitude representable in 1..=8 bytes, indexed by size - 1.
const INT_SIZE_LIMITS: [u64; 8] = [
    0xFF,
    0xFFFF,
    0xFF_FFFF,
    0xFFFF_FFFF,
    0xFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF,
    0xFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
];

/// Width of an encoded UUID in bytes.
const UUID_LEN: usize = 16;

/// How strictly element types are preserved when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Widen single floats to doubles and UUIDs to byte strings.
    Lenient,
    /// Preserve every element type exactly as encoded.
    Strict,
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during tuple encoding/decoding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TupleError {
    /// Unexpected end of input while decoding.
    #[snafu(display("unexpected end of input at offset {offset}"))]
    UnexpectedEnd {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Unknown type code encountered.
    #[snafu(display("unknown type code 0x{code:02X} at offset {offset}"))]
    UnknownTypeCode {
        /// The unknown type code.
        code: u8,
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Integer type code whose magnitude does not fit in eight bytes.
    #[snafu(display("unsupported arbitrary-precision integer code 0x{code:02X} at offset {offset}"))]
    UnsupportedIntegerSize {
        /// The integer type code.
        code: u8,
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Invalid UTF-8 string data.
    #[snafu(display("invalid UTF-8 at offset {offset}: {source}"))]
    InvalidUtf8 {
        /// Byte offset where the error occurred.
        offset: usize,
        /// The underlying UTF-8 error.
        source: std::str::Utf8Error,
    },

    /// Missing null terminator for byte/string element.
    #[snafu(display("missing null terminator at offset {offset}"))]
    MissingTerminator {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Integer magnitude outside the `i64` range while decoding.
    #[snafu(display("integer overflow at offset {offset}"))]
    IntegerOverflow {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Integer outside the `i64` range supplied for encoding.
    #[snafu(display("integer {value} exceeds the supported range (i64::MAX)"))]
    IntegerOutOfRange {
        /// The rejected value.
        value: u64,
    },

    /// Nested tuple not properly terminated.
    #[snafu(display("unterminated nested tuple at offset {offset}"))]
    UnterminatedNested {
        /// Byte offset where the error occurred.
        offset: usize,
    },
}
