use std::cmp::Ordering;

use super::DecodeMode;
use super::TupleError;
use super::decoding::decode_element;
use super::element::Element;
use crate::range::KeyRange;

// =============================================================================
// Tuple Type
// =============================================================================

/// An ordered collection of typed elements that can be packed into bytes.
///
/// Tuples are the building block for structured keys. When packed, they
/// produce bytes that sort lexicographically in the same order as the
/// original elements.
///
/// # Example
///
/// ```
/// use keystone_layer::Tuple;
///
/// let t1 = Tuple::new().push("users").push(1i64);
/// let t2 = Tuple::new().push("users").push(2i64);
///
/// assert!(t1.pack() < t2.pack());
/// assert!(t1 < t2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple {
    elements: Vec<Element>,
}

impl Tuple {
    /// Create a new empty tuple.
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Create a tuple with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
        }
    }

    /// Push an element onto the tuple (builder pattern).
    pub fn push<E: Into<Element>>(mut self, element: E) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Push an element onto the tuple (mutating).
    pub fn push_mut<E: Into<Element>>(&mut self, element: E) {
        self.elements.push(element.into());
    }

    /// Append every element of `other` (mutating).
    pub fn extend_from(&mut self, other: &Tuple) {
        self.elements.extend(other.elements.iter().cloned());
    }

    /// Get the number of elements in the tuple.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the tuple is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Get an element by index.
    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Get an iterator over the elements.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Consume the tuple, returning its elements.
    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }

    /// Pack the tuple into bytes.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.elements.len() * 8);
        self.pack_into(&mut buf);
        buf
    }

    /// Pack the tuple into an existing buffer.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        for elem in &self.elements {
            elem.pack_into(buf);
        }
    }

    /// Unpack a tuple, widening single floats to doubles and UUIDs to bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`TupleError`] if `data` is truncated, carries an unknown
    /// type code, or holds an integer outside the `i64` range.
    pub fn unpack(data: &[u8]) -> Result<Self, TupleError> {
        Self::unpack_with(data, DecodeMode::Lenient)
    }

    /// Unpack a tuple, preserving every element type exactly.
    pub fn unpack_strict(data: &[u8]) -> Result<Self, TupleError> {
        Self::unpack_with(data, DecodeMode::Strict)
    }

    /// Unpack a tuple in the given decode mode.
    ///
    /// The whole input is consumed; there is no notion of trailing bytes.
    pub fn unpack_with(data: &[u8], mode: DecodeMode) -> Result<Self, TupleError> {
        let mut tuple = Tuple::new();
        let mut offset = 0;

        while offset < data.len() {
            let (elem, consumed) = decode_element(data, offset, mode)?;
            tuple.elements.push(elem);
            offset += consumed;
        }

        Ok(tuple)
    }

    /// Get the range of keys strictly extending this tuple.
    ///
    /// Returns `[pack ++ 0x00, pack ++ 0xFF)`. Every packed tuple that has
    /// this tuple as a proper prefix lies inside the range; the packed tuple
    /// itself does not.
    ///
    /// # Example
    ///
    /// ```
    /// use keystone_layer::Tuple;
    ///
    /// let prefix = Tuple::new().push("users");
    /// let range = prefix.range();
    ///
    /// let child = Tuple::new().push("users").push(7i64).pack();
    /// assert!(range.contains(&child));
    /// assert!(!range.contains(&prefix.pack()));
    /// ```
    pub fn range(&self) -> KeyRange {
        KeyRange::tuple_children(self.pack())
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pack().cmp(&other.pack())
    }
}

impl FromIterator<Element> for Tuple {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Element>> for Tuple {
    fn from(elements: Vec<Element>) -> Self {
        Self { elements }
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
