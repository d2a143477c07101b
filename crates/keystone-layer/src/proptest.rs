//! Property-based tests for the tuple codec and subspaces.
//!
//! 1. **Roundtrip**: `unpack_strict(pack(t)) == t` for every tuple
//! 2. **Ordering**: comparing values agrees with comparing their encodings
//! 3. **Range**: proper extensions of a tuple fall inside its range, the tuple itself does not
//! 4. **Subspace**: keys round-trip and stay inside their subspace

use std::cmp::Ordering;

use proptest::prelude::*;
use uuid::Uuid;

use crate::Element;
use crate::Subspace;
use crate::Tuple;

// =============================================================================
// Strategies
// =============================================================================

/// Scalar elements of every type, including NaN and negative zero.
fn arb_scalar() -> impl Strategy<Value = Element> {
    prop_oneof![
        Just(Element::Null),
        "[a-zA-Z0-9_]{0,20}".prop_map(Element::String),
        any::<String>().prop_map(Element::String),
        prop::collection::vec(any::<u8>(), 0..50).prop_map(Element::Bytes),
        any::<i64>().prop_map(Element::Int),
        (-1000i64..1000i64).prop_map(Element::Int),
        any::<bool>().prop_map(Element::Bool),
        any::<f32>().prop_map(Element::Float),
        any::<f64>().prop_map(Element::Double),
        Just(Element::Double(-0.0)),
        Just(Element::Double(f64::NAN)),
        any::<u128>().prop_map(|n| Element::Uuid(Uuid::from_u128(n))),
    ]
}

/// Elements including nested tuples up to three levels deep.
fn arb_element() -> impl Strategy<Value = Element> {
    arb_scalar().prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(|elements| Element::Nested(Tuple::from(elements)))
    })
}

/// Tuples with 0-5 elements.
fn arb_tuple() -> impl Strategy<Value = Tuple> {
    prop::collection::vec(arb_element(), 0..5).prop_map(Tuple::from)
}

/// Simple string tuples.
fn arb_string_tuple() -> impl Strategy<Value = Tuple> {
    prop::collection::vec("[a-z]{0,5}", 1..4)
        .prop_map(|strings| strings.into_iter().map(Element::String).collect())
}

fn assert_order_matches(expected: Ordering, a: &[u8], b: &[u8]) -> Result<(), TestCaseError> {
    prop_assert_eq!(a.cmp(b), expected, "encodings {:?} and {:?} disagree with value order", a, b);
    Ok(())
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_roundtrip_strict(tuple in arb_tuple()) {
        let packed = tuple.pack();
        let unpacked = Tuple::unpack_strict(&packed).expect("unpack should succeed");
        prop_assert_eq!(&tuple, &unpacked);
        prop_assert_eq!(unpacked.pack(), packed);
    }

    #[test]
    fn prop_int_ordering(a in any::<i64>(), b in any::<i64>()) {
        assert_order_matches(a.cmp(&b), &Tuple::new().push(a).pack(), &Tuple::new().push(b).pack())?;
    }

    #[test]
    fn prop_double_ordering(a in any::<f64>(), b in any::<f64>()) {
        assert_order_matches(a.total_cmp(&b), &Tuple::new().push(a).pack(), &Tuple::new().push(b).pack())?;
    }

    #[test]
    fn prop_float_ordering(a in any::<f32>(), b in any::<f32>()) {
        assert_order_matches(a.total_cmp(&b), &Tuple::new().push(a).pack(), &Tuple::new().push(b).pack())?;
    }

    #[test]
    fn prop_bytes_ordering(a in prop::collection::vec(any::<u8>(), 0..12), b in prop::collection::vec(any::<u8>(), 0..12)) {
        assert_order_matches(a.cmp(&b), &Tuple::new().push(a.clone()).pack(), &Tuple::new().push(b.clone()).pack())?;
    }

    #[test]
    fn prop_string_ordering(a in any::<String>(), b in any::<String>()) {
        // UTF-8 byte order equals code point order.
        assert_order_matches(a.cmp(&b), &Tuple::new().push(&a).pack(), &Tuple::new().push(&b).pack())?;
    }

    #[test]
    fn prop_tuple_ordering(a in arb_string_tuple(), b in arb_string_tuple()) {
        let strings = |t: &Tuple| t.iter().filter_map(|e| e.as_str().map(str::to_owned)).collect::<Vec<_>>();
        assert_order_matches(strings(&a).cmp(&strings(&b)), &a.pack(), &b.pack())?;
    }

    #[test]
    fn prop_range_contains_proper_extensions(prefix in arb_tuple(), suffix in prop::collection::vec(arb_element(), 1..3)) {
        let range = prefix.range();
        let mut extended = prefix.clone();
        for elem in suffix {
            extended.push_mut(elem);
        }

        prop_assert!(range.contains(&extended.pack()));
        prop_assert!(!range.contains(&prefix.pack()));
    }

    #[test]
    fn prop_range_excludes_unrelated(a in any::<i64>(), b in any::<i64>(), tail in arb_element()) {
        prop_assume!(a != b);
        let range = Tuple::new().push(a).range();
        prop_assert!(!range.contains(&Tuple::new().push(b).push(tail).pack()));
    }

    #[test]
    fn prop_subspace_roundtrip(prefix in arb_tuple(), key in arb_tuple()) {
        let subspace = Subspace::new(&prefix);
        let packed = subspace.pack(&key);
        prop_assert!(subspace.contains(&packed));
        prop_assert_eq!(subspace.unpack(&packed).expect("unpack should succeed"), key);
    }

    #[test]
    fn prop_nested_subspace_hierarchy(outer in arb_string_tuple(), inner in arb_string_tuple(), key in arb_tuple()) {
        let outer = Subspace::new(&outer);
        let inner = outer.subspace(&inner);
        let packed = inner.pack(&key);

        prop_assert!(inner.contains(&packed));
        prop_assert!(outer.contains(&packed));
        prop_assert!(outer.range().contains(&packed));
    }
}
