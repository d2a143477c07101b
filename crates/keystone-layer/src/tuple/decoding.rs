use snafu::ResultExt;
use uuid::Uuid;

use super::BYTES_CODE;
use super::DOUBLE_CODE;
use super::DecodeMode;
use super::FALSE_CODE;
use super::FLOAT_CODE;
use super::INT_ZERO_CODE;
use super::InvalidUtf8Snafu;
use super::NEG_INT_ARBITRARY_CODE;
use super::NEG_INT_MIN_CODE;
use super::NESTED_CODE;
use super::NULL_CODE;
use super::NULL_ESCAPE;
use super::POS_INT_ARBITRARY_CODE;
use super::POS_INT_MAX_CODE;
use super::STRING_CODE;
use super::TRUE_CODE;
use super::TupleError;
use super::UUID_CODE;
use super::UUID_LEN;
use super::element::Element;
use super::encoding::size_mask;
use super::tuple_type::Tuple;

// =============================================================================
// Decoding Functions
// =============================================================================

/// Decode a single element from bytes at the given offset.
///
/// Returns the decoded element and the number of bytes consumed.
pub(super) fn decode_element(data: &[u8], offset: usize, mode: DecodeMode) -> Result<(Element, usize), TupleError> {
    let Some(&code) = data.get(offset) else {
        return Err(TupleError::UnexpectedEnd { offset });
    };

    match code {
        NULL_CODE => Ok((Element::Null, 1)),

        BYTES_CODE => {
            let (bytes, consumed) = decode_bytes_with_null_escaping(data, offset + 1)?;
            Ok((Element::Bytes(bytes), consumed + 1))
        }

        STRING_CODE => {
            let (bytes, consumed) = decode_bytes_with_null_escaping(data, offset + 1)?;
            let s = String::from_utf8(bytes)
                .map_err(|e| e.utf8_error())
                .context(InvalidUtf8Snafu { offset })?;
            Ok((Element::String(s), consumed + 1))
        }

        NESTED_CODE => {
            let (tuple, consumed) = decode_nested_tuple(data, offset + 1, mode)?;
            Ok((Element::Nested(tuple), consumed + 1))
        }

        NEG_INT_ARBITRARY_CODE | POS_INT_ARBITRARY_CODE => Err(TupleError::UnsupportedIntegerSize { code, offset }),

        NEG_INT_MIN_CODE..=POS_INT_MAX_CODE => {
            let (n, consumed) = decode_int(data, offset, code)?;
            Ok((Element::Int(n), consumed))
        }

        FLOAT_CODE => {
            let raw = fixed::<4>(data, offset)?;
            let f = decode_float(raw);
            match mode {
                DecodeMode::Strict => Ok((Element::Float(f), 5)),
                DecodeMode::Lenient => Ok((Element::Double(f64::from(f)), 5)),
            }
        }

        DOUBLE_CODE => {
            let raw = fixed::<8>(data, offset)?;
            Ok((Element::Double(decode_double(raw)), 9))
        }

        FALSE_CODE => Ok((Element::Bool(false), 1)),
        TRUE_CODE => Ok((Element::Bool(true), 1)),

        UUID_CODE => {
            let raw = fixed::<UUID_LEN>(data, offset)?;
            match mode {
                DecodeMode::Strict => Ok((Element::Uuid(Uuid::from_bytes(raw)), UUID_LEN + 1)),
                DecodeMode::Lenient => Ok((Element::Bytes(raw.to_vec()), UUID_LEN + 1)),
            }
        }

        _ => Err(TupleError::UnknownTypeCode { code, offset }),
    }
}

/// Read the `N` bytes following the type code at `offset`.
fn fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], TupleError> {
    data.get(offset + 1..offset + 1 + N)
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
        .ok_or(TupleError::UnexpectedEnd { offset })
}

/// Decode bytes with null escaping (`0x00 0xFF` -> `0x00`).
///
/// Returns the decoded bytes and the number of bytes consumed (including terminator).
fn decode_bytes_with_null_escaping(data: &[u8], start: usize) -> Result<(Vec<u8>, usize), TupleError> {
    let mut result = Vec::new();
    let mut i = start;

    while i < data.len() {
        let b = data[i];
        if b != 0x00 {
            result.push(b);
            i += 1;
        } else if data.get(i + 1) == Some(&NULL_ESCAPE) {
            result.push(0x00);
            i += 2;
        } else {
            return Ok((result, i - start + 1));
        }
    }

    Err(TupleError::MissingTerminator { offset: start })
}

/// Decode an integer whose type code is `code`.
fn decode_int(data: &[u8], offset: usize, code: u8) -> Result<(i64, usize), TupleError> {
    if code == INT_ZERO_CODE {
        return Ok((0, 1));
    }

    let size = code.abs_diff(INT_ZERO_CODE);
    let body = data
        .get(offset + 1..offset + 1 + size as usize)
        .ok_or(TupleError::UnexpectedEnd { offset })?;
    let raw = decode_uint_be(body);

    if code > INT_ZERO_CODE {
        let n = i64::try_from(raw).map_err(|_| TupleError::IntegerOverflow { offset })?;
        return Ok((n, 1 + size as usize));
    }

    let magnitude = !raw & size_mask(size);
    let n = 0i64
        .checked_sub_unsigned(magnitude)
        .ok_or(TupleError::IntegerOverflow { offset })?;
    Ok((n, 1 + size as usize))
}

/// Decode an unsigned integer from big-endian bytes.
fn decode_uint_be(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Decode a 32-bit float from its order-preserving form.
fn decode_float(raw: [u8; 4]) -> f32 {
    let transformed = u32::from_be_bytes(raw);
    let bits = if transformed & 0x8000_0000 != 0 {
        transformed ^ 0x8000_0000
    } else {
        !transformed
    };
    f32::from_bits(bits)
}

/// Decode a 64-bit double from its order-preserving form.
fn decode_double(raw: [u8; 8]) -> f64 {
    let transformed = u64::from_be_bytes(raw);
    let bits = if transformed & 0x8000_0000_0000_0000 != 0 {
        transformed ^ 0x8000_0000_0000_0000
    } else {
        !transformed
    };
    f64::from_bits(bits)
}

/// Decode the body of a nested tuple starting just after its type code.
fn decode_nested_tuple(data: &[u8], start: usize, mode: DecodeMode) -> Result<(Tuple, usize), TupleError> {
    let mut tuple = Tuple::new();
    let mut i = start;

    while i < data.len() {
        if data[i] == NULL_CODE {
            if data.get(i + 1) == Some(&NULL_ESCAPE) {
                tuple.push_mut(Element::Null);
                i += 2;
            } else {
                return Ok((tuple, i - start + 1));
            }
        } else {
            let (elem, consumed) = decode_element(data, i, mode)?;
            tuple.push_mut(elem);
            i += consumed;
        }
    }

    Err(TupleError::UnterminatedNested { offset: start })
}
