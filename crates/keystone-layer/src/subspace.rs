//! Subspaces: a key prefix plus key and value transformers.
//!
//! A [`Subspace`] scopes every key it produces under a fixed byte prefix.
//! Child subspaces are derived with [`Subspace::at`] (prefix extended by an
//! encoded key) or [`Subspace::at_raw`] (prefix extended by literal bytes).
//! Subspaces are immutable values; every derivation returns a new one.
//!
//! # Example
//!
//! ```
//! use keystone_layer::Subspace;
//! use keystone_layer::Tuple;
//!
//! let users = Subspace::new(&Tuple::new().push("users"));
//! let key = users.pack(&Tuple::new().push(42i64).push("name"));
//!
//! assert!(users.contains(&key));
//! assert_eq!(users.unpack(&key).unwrap(), Tuple::new().push(42i64).push("name"));
//! ```

use std::fmt;

use crate::error::SubspaceError;
use crate::range::KeyRange;
use crate::transformer::RawEncoding;
use crate::transformer::Transformer;
use crate::transformer::TupleEncoding;
use crate::tuple::Tuple;

// =============================================================================
// Prefixed key transformer
// =============================================================================

/// The declared key transformer with the subspace prefix baked in.
#[derive(Clone)]
struct PrefixedKeys<K> {
    prefix: Vec<u8>,
    inner: K,
}

impl<K: Transformer> PrefixedKeys<K> {
    fn pack(&self, item: &K::Item) -> Result<Vec<u8>, SubspaceError> {
        let encoded = self.inner.pack(item)?;
        Ok(self.prefixed(&encoded))
    }

    fn unpack(&self, key: &[u8]) -> Result<K::Item, SubspaceError> {
        self.inner.unpack(self.strip(key)?)
    }

    fn prefixed(&self, suffix: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + suffix.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(suffix);
        out
    }

    fn strip<'a>(&self, key: &'a [u8]) -> Result<&'a [u8], SubspaceError> {
        key.strip_prefix(self.prefix.as_slice())
            .ok_or_else(|| SubspaceError::NotInSubspace {
                key: key.to_vec(),
                prefix: self.prefix.clone(),
            })
    }
}

// =============================================================================
// Subspace
// =============================================================================

/// A key prefix with key and value transformers.
///
/// Defaults to tuple-encoded keys and raw byte values.
#[derive(Clone)]
pub struct Subspace<K = TupleEncoding, V = RawEncoding> {
    keys: PrefixedKeys<K>,
    values: V,
}

impl Subspace {
    /// Subspace whose prefix is the packed `prefix` tuple.
    pub fn new(prefix: &Tuple) -> Self {
        Self::from_bytes(prefix.pack())
    }

    /// Subspace with a raw byte prefix.
    pub fn from_bytes(prefix: impl Into<Vec<u8>>) -> Self {
        Self::with_encodings(prefix, TupleEncoding, RawEncoding)
    }
}

impl<K: Transformer, V: Transformer> Subspace<K, V> {
    /// Subspace with a raw prefix and explicit transformers.
    pub fn with_encodings(prefix: impl Into<Vec<u8>>, key_encoding: K, value_encoding: V) -> Self {
        Self {
            keys: PrefixedKeys {
                prefix: prefix.into(),
                inner: key_encoding,
            },
            values: value_encoding,
        }
    }

    /// The raw prefix bytes.
    pub fn prefix(&self) -> &[u8] {
        &self.keys.prefix
    }

    /// The declared key transformer (without the prefix).
    pub fn key_encoding(&self) -> &K {
        &self.keys.inner
    }

    /// The value transformer.
    pub fn value_encoding(&self) -> &V {
        &self.values
    }

    /// Child subspace at `prefix ++ key_encoding.pack(key)`, keeping both transformers.
    pub fn at(&self, key: &K::Item) -> Result<Self, SubspaceError> {
        Ok(Self::with_encodings(self.keys.pack(key)?, self.keys.inner.clone(), self.values.clone()))
    }

    /// Child subspace with replacement transformers.
    ///
    /// With `key == None` the child shares this subspace's prefix.
    pub fn at_with<K2: Transformer, V2: Transformer>(
        &self,
        key: Option<&K::Item>,
        key_encoding: K2,
        value_encoding: V2,
    ) -> Result<Subspace<K2, V2>, SubspaceError> {
        let prefix = match key {
            Some(key) => self.keys.pack(key)?,
            None => self.keys.prefix.clone(),
        };
        Ok(Subspace::with_encodings(prefix, key_encoding, value_encoding))
    }

    /// Child subspace at `prefix ++ bytes`, bypassing the key transformer.
    pub fn at_raw(&self, bytes: &[u8]) -> Self {
        Self::with_encodings(self.keys.prefixed(bytes), self.keys.inner.clone(), self.values.clone())
    }

    /// Same prefix, different key transformer.
    pub fn with_key_encoding<K2: Transformer>(&self, key_encoding: K2) -> Subspace<K2, V> {
        Subspace::with_encodings(self.keys.prefix.clone(), key_encoding, self.values.clone())
    }

    /// Same prefix, different value transformer.
    pub fn with_value_encoding<V2: Transformer>(&self, value_encoding: V2) -> Subspace<K, V2> {
        Subspace::with_encodings(self.keys.prefix.clone(), self.keys.inner.clone(), value_encoding)
    }

    /// Encode a key, including the prefix.
    pub fn pack_key(&self, key: &K::Item) -> Result<Vec<u8>, SubspaceError> {
        self.keys.pack(key)
    }

    /// Decode a full key, which must start with the prefix.
    pub fn unpack_key(&self, key: &[u8]) -> Result<K::Item, SubspaceError> {
        self.keys.unpack(key)
    }

    /// Encode a value.
    pub fn pack_value(&self, value: &V::Item) -> Result<Vec<u8>, SubspaceError> {
        self.values.pack(value)
    }

    /// Decode a value.
    pub fn unpack_value(&self, value: &[u8]) -> Result<V::Item, SubspaceError> {
        self.values.unpack(value)
    }

    /// Range of full keys under `key`.
    ///
    /// Uses the key transformer's own range when it defines one, otherwise
    /// `[pack_key ++ 0x00, pack_key ++ 0xFF)`.
    pub fn pack_range(&self, key: &K::Item) -> Result<KeyRange, SubspaceError> {
        match self.keys.inner.range(key)? {
            Some(range) => Ok(KeyRange {
                begin: self.keys.prefixed(&range.begin),
                end: self.keys.prefixed(&range.end),
            }),
            None => Ok(KeyRange::tuple_children(self.keys.pack(key)?)),
        }
    }

    /// Every key that starts with the prefix: `[prefix, strinc(prefix))`.
    pub fn range(&self) -> KeyRange {
        KeyRange::starts_with(&self.keys.prefix)
    }

    /// Byte-prefix test; does not check that the rest decodes.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.keys.prefix)
    }
}

impl<V: Transformer> Subspace<TupleEncoding, V> {
    /// Pack a tuple key under this subspace.
    pub fn pack(&self, key: &Tuple) -> Vec<u8> {
        let mut out = self.keys.prefix.clone();
        key.pack_into(&mut out);
        out
    }

    /// Unpack a full key into the tuple after the prefix.
    pub fn unpack(&self, key: &[u8]) -> Result<Tuple, SubspaceError> {
        self.keys.unpack(key)
    }

    /// Nested subspace at `prefix ++ pack(suffix)`.
    pub fn subspace(&self, suffix: &Tuple) -> Self {
        Self::with_encodings(self.pack(suffix), TupleEncoding, self.values.clone())
    }
}

impl<K, V> fmt::Debug for Subspace<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subspace")
            .field("prefix", &hex::encode(&self.keys.prefix))
            .finish_non_exhaustive()
    }
}

impl<K, V> PartialEq for Subspace<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.keys.prefix == other.keys.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::CounterEncoding;
    use crate::transformer::StringEncoding;
    use crate::transformer::VoidEncoding;

    #[test]
    fn test_child_prefix_is_parent_plus_packed_key() {
        let root = Subspace::from_bytes(vec![0xFE]);
        let child = root.at(&Tuple::new().push(b"hca")).unwrap();

        let mut expected = vec![0xFE];
        expected.extend(Tuple::new().push(b"hca").pack());
        assert_eq!(child.prefix(), expected.as_slice());

        let key = Tuple::new().push(1i64);
        assert_eq!(child.pack_key(&key).unwrap(), [expected, key.pack()].concat());
    }

    #[test]
    fn test_at_raw_bypasses_key_encoding() {
        let s = Subspace::from_bytes(b"app".to_vec());
        let raw = s.at_raw(&[0xFE]);
        assert_eq!(raw.prefix(), b"app\xfe");
    }

    #[test]
    fn test_at_with_none_shares_prefix() {
        let s = Subspace::from_bytes(b"p".to_vec());
        let strings = s.at_with(None, StringEncoding, StringEncoding).unwrap();
        assert_eq!(strings.prefix(), b"p");
        assert_eq!(strings.pack_key(&"k".to_string()).unwrap(), b"pk".to_vec());
    }

    #[test]
    fn test_derivations_do_not_mutate_receiver() {
        let s = Subspace::from_bytes(b"p".to_vec());
        let counters = s.with_value_encoding(CounterEncoding);
        let _ = s.at(&Tuple::new().push("child")).unwrap();
        let _ = s.with_key_encoding(StringEncoding);

        assert_eq!(s.prefix(), b"p");
        assert_eq!(counters.prefix(), b"p");
        assert_eq!(counters.pack_value(&3).unwrap(), 3i64.to_le_bytes().to_vec());
        assert_eq!(s.pack_value(&b"raw".to_vec()).unwrap(), b"raw".to_vec());
    }

    #[test]
    fn test_unpack_key_rejects_foreign_keys() {
        let s = Subspace::new(&Tuple::new().push("users"));
        let other = Subspace::new(&Tuple::new().push("groups"));
        let key = other.pack(&Tuple::new().push(1i64));

        match s.unpack_key(&key) {
            Err(SubspaceError::NotInSubspace { prefix, .. }) => assert_eq!(prefix, s.prefix()),
            other => panic!("expected NotInSubspace, got {other:?}"),
        }
    }

    #[test]
    fn test_pack_range_uses_tuple_range() {
        let s = Subspace::from_bytes(vec![0x01]);
        let key = Tuple::new().push(0i64);
        let range = s.pack_range(&key).unwrap();

        assert_eq!(range.begin, vec![0x01, 0x14, 0x00]);
        assert_eq!(range.end, vec![0x01, 0x14, 0xFF]);
        assert!(range.contains(&s.pack(&Tuple::new().push(0i64).push("name"))));
    }

    #[test]
    fn test_pack_range_fallback_brackets_packed_key() {
        let s = Subspace::with_encodings(b"s".to_vec(), StringEncoding, VoidEncoding);
        let range = s.pack_range(&"ab".to_string()).unwrap();
        assert_eq!(range.begin, b"sab\x00".to_vec());
        assert_eq!(range.end, b"sab\xff".to_vec());
    }

    #[test]
    fn test_contains_is_prefix_test_only() {
        let s = Subspace::from_bytes(vec![0x15]);
        assert!(s.contains(&[0x15]));
        assert!(s.contains(&[0x15, 0xFF, 0xFF]));
        assert!(!s.contains(&[0x14]));
    }

    #[test]
    fn test_whole_subspace_range() {
        let s = Subspace::from_bytes(vec![0x15, 0xFF]);
        let range = s.range();
        assert_eq!(range.begin, vec![0x15, 0xFF]);
        assert_eq!(range.end, vec![0x16]);
    }

    #[test]
    fn test_nested_subspace_and_unpack() {
        let app = Subspace::new(&Tuple::new().push("app"));
        let users = app.subspace(&Tuple::new().push("users"));
        let key = users.pack(&Tuple::new().push(7i64));

        assert!(app.contains(&key));
        assert_eq!(users.unpack(&key).unwrap(), Tuple::new().push(7i64));
        assert_eq!(app.unpack(&key).unwrap(), Tuple::new().push("users").push(7i64));
    }

    #[test]
    fn test_debug_shows_hex_prefix() {
        let s = Subspace::from_bytes(vec![0xFE, 0x01]);
        assert!(format!("{s:?}").contains("fe01"));
    }
}
