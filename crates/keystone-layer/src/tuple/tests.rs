use uuid::Uuid;

use super::*;

fn packed(t: &Tuple) -> Vec<u8> {
    t.pack()
}

// =========================================================================
// Known Encodings
// =========================================================================

#[test]
fn test_known_negative_integer() {
    let t = Tuple::new().push(-5_551_212i64);
    assert_eq!(packed(&t), vec![0x11, 0xAB, 0x4B, 0x93]);
}

#[test]
fn test_known_zero() {
    assert_eq!(packed(&Tuple::new().push(0i64)), vec![INT_ZERO_CODE]);
}

#[test]
fn test_known_null() {
    assert_eq!(packed(&Tuple::new().push(())), vec![NULL_CODE]);
}

#[test]
fn test_known_unicode_with_embedded_null() {
    let t = Tuple::new().push("F\u{00D4}O\u{0000}bar");
    assert_eq!(packed(&t), vec![0x02, 0x46, 0xC3, 0x94, 0x4F, 0x00, 0xFF, 0x62, 0x61, 0x72, 0x00]);
}

#[test]
fn test_known_bytes_with_embedded_null() {
    let t = Tuple::new().push(b"foo\x00bar");
    assert_eq!(packed(&t), b"\x01foo\x00\xffbar\x00".to_vec());
}

#[test]
fn test_known_nested_with_null_and_empty() {
    let inner = Tuple::new().push(b"foo\x00bar").push(()).push(Tuple::new());
    let t = Tuple::new().push(inner);
    assert_eq!(packed(&t), b"\x05\x01foo\x00\xffbar\x00\x00\xff\x05\x00\x00".to_vec());
}

#[test]
fn test_known_four_byte_negative() {
    let t = Tuple::new().push(-0xFFFF_FFFFi64);
    assert_eq!(packed(&t), vec![0x10, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn test_known_doubles() {
    assert_eq!(
        packed(&Tuple::new().push(f64::NAN)),
        vec![DOUBLE_CODE, 0xFF, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        packed(&Tuple::new().push(-0.0f64)),
        vec![DOUBLE_CODE, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
    );
}

#[test]
fn test_known_uuid() {
    let id = Uuid::from_bytes([0x11; 16]);
    let bytes = packed(&Tuple::new().push(id));
    assert_eq!(bytes[0], UUID_CODE);
    assert_eq!(&bytes[1..], &[0x11; 16]);
}

// =========================================================================
// Element Round Trips
// =========================================================================

#[test]
fn test_empty_tuple() {
    let t = Tuple::new();
    assert!(t.is_empty());
    assert!(t.pack().is_empty());
    assert_eq!(Tuple::unpack(&[]).unwrap(), t);
}

#[test]
fn test_string_element() {
    let t = Tuple::new().push("hello");
    let bytes = t.pack();

    assert_eq!(bytes[0], STRING_CODE);
    assert_eq!(&bytes[1..6], b"hello");
    assert_eq!(bytes[6], 0x00);

    let unpacked = Tuple::unpack(&bytes).unwrap();
    assert_eq!(unpacked.get(0).and_then(Element::as_str), Some("hello"));
}

#[test]
fn test_integer_boundaries() {
    for n in [1i64, 127, 128, 255, 256, 65535, 65536, i64::MAX, -1, -255, -256, -65536, i64::MIN] {
        let t = Tuple::new().push(n);
        let unpacked = Tuple::unpack(&t.pack()).unwrap();
        assert_eq!(unpacked.get(0), Some(&Element::Int(n)), "failed for n={n}");
    }
}

#[test]
fn test_u64_conversion_fails_fast() {
    assert_eq!(Element::try_from(42u64).unwrap(), Element::Int(42));
    let err = Element::try_from(u64::MAX).unwrap_err();
    assert!(matches!(err, TupleError::IntegerOutOfRange { value: u64::MAX }));
}

#[test]
fn test_nested_tuple_with_null() {
    let inner = Tuple::new().push(()).push("after_null");
    let outer = Tuple::new().push("outer").push(inner.clone());

    let unpacked = Tuple::unpack(&outer.pack()).unwrap();
    let nested = unpacked.get(1).and_then(Element::as_tuple).unwrap();
    assert_eq!(nested, &inner);
    assert!(nested.get(0).unwrap().is_null());
}

#[test]
fn test_strict_preserves_float_and_uuid() {
    let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
    let t = Tuple::new().push(1.5f32).push(id).push(Tuple::new().push(2.5f32));

    let strict = Tuple::unpack_strict(&t.pack()).unwrap();
    assert_eq!(strict, t);
}

#[test]
fn test_lenient_widens_float_and_uuid() {
    let id = Uuid::from_u128(7);
    let t = Tuple::new().push(1.5f32).push(id);

    let lenient = Tuple::unpack(&t.pack()).unwrap();
    assert_eq!(lenient.get(0), Some(&Element::Double(1.5)));
    assert_eq!(lenient.get(1), Some(&Element::Bytes(id.as_bytes().to_vec())));
}

#[test]
fn test_float_special_values_roundtrip() {
    for f in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN, -0.0, 0.0, f32::MIN_POSITIVE] {
        let t = Tuple::new().push(f);
        let unpacked = Tuple::unpack_strict(&t.pack()).unwrap();
        match unpacked.get(0) {
            Some(Element::Float(g)) => assert_eq!(g.to_bits(), f.to_bits()),
            other => panic!("expected Float element, got {other:?}"),
        }
    }
}

#[test]
fn test_double_special_values_roundtrip() {
    for d in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -0.0, 0.0] {
        let t = Tuple::new().push(d);
        let unpacked = Tuple::unpack(&t.pack()).unwrap();
        match unpacked.get(0) {
            Some(Element::Double(e)) => assert_eq!(e.to_bits(), d.to_bits()),
            other => panic!("expected Double element, got {other:?}"),
        }
    }
}

// =========================================================================
// Ordering
// =========================================================================

#[test]
fn test_integer_ordering() {
    let values = [i64::MIN, -65536, -1000, -1, 0, 1, 1000, 65536, i64::MAX];
    let packed: Vec<Vec<u8>> = values.iter().map(|&n| Tuple::new().push(n).pack()).collect();

    for i in 1..packed.len() {
        assert!(packed[i - 1] < packed[i], "ordering failed: {} should be < {}", values[i - 1], values[i]);
    }
}

#[test]
fn test_double_ordering_includes_negative_zero() {
    let values = [f64::NEG_INFINITY, -1.0, -0.0, 0.0, 1.0, f64::INFINITY];
    let packed: Vec<Vec<u8>> = values.iter().map(|&d| Tuple::new().push(d).pack()).collect();

    for i in 1..packed.len() {
        assert!(packed[i - 1] < packed[i], "double ordering failed at {}", values[i]);
    }
}

#[test]
fn test_type_code_ordering() {
    let ordered = [
        Tuple::new().push(()),
        Tuple::new().push(vec![0u8]),
        Tuple::new().push("a"),
        Tuple::new().push(Tuple::new()),
        Tuple::new().push(-1i64),
        Tuple::new().push(0i64),
        Tuple::new().push(1i64),
        Tuple::new().push(0.0f32),
        Tuple::new().push(0.0f64),
        Tuple::new().push(false),
        Tuple::new().push(true),
        Tuple::new().push(Uuid::nil()),
    ];

    for pair in ordered.windows(2) {
        assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
    }
}

#[test]
fn test_shorter_tuple_sorts_first() {
    let a = Tuple::new().push("a");
    let ab = Tuple::new().push("a").push(());
    assert!(a < ab);
}

// =========================================================================
// Range
// =========================================================================

#[test]
fn test_range_bounds() {
    let prefix = Tuple::new().push("users").push(1i64);
    let range = prefix.range();

    let mut begin = prefix.pack();
    begin.push(0x00);
    let mut end = prefix.pack();
    end.push(0xFF);
    assert_eq!(range.begin, begin);
    assert_eq!(range.end, end);
}

#[test]
fn test_range_membership() {
    let prefix = Tuple::new().push("users").push(1i64);
    let range = prefix.range();

    assert!(range.contains(&Tuple::new().push("users").push(1i64).push("profile").pack()));
    assert!(range.contains(&Tuple::new().push("users").push(1i64).push(()).pack()));
    assert!(!range.contains(&prefix.pack()));
    assert!(!range.contains(&Tuple::new().push("users").push(2i64).pack()));
}

// =========================================================================
// Error Paths
// =========================================================================

#[test]
fn test_error_unknown_type_code() {
    match Tuple::unpack(&[0x40]) {
        Err(TupleError::UnknownTypeCode { code, offset }) => {
            assert_eq!(code, 0x40);
            assert_eq!(offset, 0);
        }
        other => panic!("expected UnknownTypeCode error, got {other:?}"),
    }
}

#[test]
fn test_error_arbitrary_precision_codes() {
    for code in [0x0Bu8, 0x1D] {
        let result = Tuple::unpack(&[code, 0x09, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(
            matches!(result, Err(TupleError::UnsupportedIntegerSize { code: c, .. }) if c == code),
            "code 0x{code:02X} should be rejected"
        );
    }
}

#[test]
fn test_error_integer_overflow() {
    // 2^63 as a positive 8-byte integer does not fit in i64.
    let data = [0x1C, 0x80, 0, 0, 0, 0, 0, 0, 0];
    assert!(matches!(Tuple::unpack(&data), Err(TupleError::IntegerOverflow { .. })));

    // -(2^63) is representable, -(2^63 + 1) is not.
    let min = [0x0C, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
    assert_eq!(Tuple::unpack(&min).unwrap().get(0), Some(&Element::Int(i64::MIN)));
    let below_min = [0x0C, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE];
    assert!(matches!(Tuple::unpack(&below_min), Err(TupleError::IntegerOverflow { .. })));
}

#[test]
fn test_error_truncated_integer() {
    assert!(matches!(Tuple::unpack(&[0x16, 0x01]), Err(TupleError::UnexpectedEnd { .. })));
}

#[test]
fn test_error_truncated_double() {
    assert!(matches!(Tuple::unpack(&[DOUBLE_CODE, 0x80]), Err(TupleError::UnexpectedEnd { .. })));
}

#[test]
fn test_error_missing_terminator() {
    assert!(matches!(
        Tuple::unpack(&[BYTES_CODE, b'a', 0x00, 0xFF]),
        Err(TupleError::MissingTerminator { .. })
    ));
}

#[test]
fn test_error_invalid_utf8() {
    let data = [STRING_CODE, 0xC3, 0x28, 0x00];
    assert!(matches!(Tuple::unpack(&data), Err(TupleError::InvalidUtf8 { .. })));
}

#[test]
fn test_error_unterminated_nested() {
    let data = [NESTED_CODE, INT_ZERO_CODE];
    assert!(matches!(Tuple::unpack(&data), Err(TupleError::UnterminatedNested { .. })));
}

#[test]
fn test_error_display_carries_offset() {
    let err = Tuple::unpack(&[INT_ZERO_CODE, 0x40]).unwrap_err();
    let display = err.to_string();
    assert!(display.contains("0x40"));
    assert!(display.contains("offset 1"));
}
