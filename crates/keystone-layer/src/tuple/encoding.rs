use super::BYTES_CODE;
use super::DOUBLE_CODE;
use super::FALSE_CODE;
use super::FLOAT_CODE;
use super::INT_SIZE_LIMITS;
use super::INT_ZERO_CODE;
use super::NESTED_CODE;
use super::NULL_CODE;
use super::NULL_ESCAPE;
use super::STRING_CODE;
use super::TRUE_CODE;
use super::UUID_CODE;
use super::element::Element;

// =============================================================================
// Encoding Functions
// =============================================================================

/// Append the encoding of one top-level element to `buf`.
pub(super) fn encode_element(elem: &Element, buf: &mut Vec<u8>) {
    match elem {
        Element::Null => buf.push(NULL_CODE),
        Element::Bytes(bytes) => {
            buf.push(BYTES_CODE);
            encode_bytes_with_null_escaping(bytes, buf);
            buf.push(0x00);
        }
        Element::String(s) => {
            buf.push(STRING_CODE);
            encode_bytes_with_null_escaping(s.as_bytes(), buf);
            buf.push(0x00);
        }
        Element::Nested(tuple) => {
            buf.push(NESTED_CODE);
            for child in tuple.iter() {
                // A bare 0x00 would terminate the nested tuple.
                if child.is_null() {
                    buf.push(NULL_CODE);
                    buf.push(NULL_ESCAPE);
                } else {
                    encode_element(child, buf);
                }
            }
            buf.push(0x00);
        }
        Element::Int(n) => encode_int(*n, buf),
        Element::Float(f) => {
            buf.push(FLOAT_CODE);
            encode_float(*f, buf);
        }
        Element::Double(d) => {
            buf.push(DOUBLE_CODE);
            encode_double(*d, buf);
        }
        Element::Bool(b) => buf.push(if *b { TRUE_CODE } else { FALSE_CODE }),
        Element::Uuid(u) => {
            buf.push(UUID_CODE);
            buf.extend_from_slice(u.as_bytes());
        }
    }
}

/// Copy `bytes` into `buf`, replacing every `0x00` with `0x00 0xFF`.
fn encode_bytes_with_null_escaping(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        buf.push(b);
        if b == 0x00 {
            buf.push(NULL_ESCAPE);
        }
    }
}

/// Encode an integer using the variable-length scheme.
///
/// - Zero: 0x14
/// - Positive: 0x14 + size, then big-endian magnitude
/// - Negative: 0x14 - size, then the one's complement of the magnitude
fn encode_int(n: i64, buf: &mut Vec<u8>) {
    if n == 0 {
        buf.push(INT_ZERO_CODE);
        return;
    }

    let magnitude = n.unsigned_abs();
    let size = int_size(magnitude);

    if n > 0 {
        buf.push(INT_ZERO_CODE + size);
        encode_uint_be(magnitude, size, buf);
    } else {
        buf.push(INT_ZERO_CODE - size);
        encode_uint_be(!magnitude & size_mask(size), size, buf);
    }
}

/// Minimal number of bytes needed to hold `n`.
fn int_size(n: u64) -> u8 {
    INT_SIZE_LIMITS
        .iter()
        .position(|&limit| n <= limit)
        .map_or(8, |i| (i + 1) as u8)
}

/// Mask selecting the low `size` bytes of a u64.
pub(super) fn size_mask(size: u8) -> u64 {
    if size >= 8 { u64::MAX } else { (1u64 << (u32::from(size) * 8)) - 1 }
}

/// Append the low `size` bytes of `n` in big-endian order.
fn encode_uint_be(n: u64, size: u8, buf: &mut Vec<u8>) {
    let bytes = n.to_be_bytes();
    buf.extend_from_slice(&bytes[8 - size as usize..]);
}

/// Encode a 32-bit float so that byte order matches numeric order.
///
/// Positive values get their sign bit flipped; negative values get every
/// bit flipped.
fn encode_float(f: f32, buf: &mut Vec<u8>) {
    let bits = f.to_bits();
    let transformed = if bits & 0x8000_0000 != 0 { !bits } else { bits ^ 0x8000_0000 };
    buf.extend_from_slice(&transformed.to_be_bytes());
}

/// Encode a 64-bit double so that byte order matches numeric order.
fn encode_double(f: f64, buf: &mut Vec<u8>) {
    let bits = f.to_bits();
    let transformed = if bits & 0x8000_0000_0000_0000 != 0 {
        !bits
    } else {
        bits ^ 0x8000_0000_0000_0000
    };
    buf.extend_from_slice(&transformed.to_be_bytes());
}
