//! SerialMap implementation
//!
//! `HashMap` wrapper that can encode itself into a byte buffer and decode
//! itself back from an arbitrary offset of one.

use std::borrow::Borrow;
use std::collections::hash_map::{self, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::io::Cursor;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TesseraError};

/// Width of the leading entry count
const COUNT_SIZE: usize = 8;

/// Serializable key/value map
#[derive(Debug, Clone)]
pub struct SerialMap<K, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash, V> SerialMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or replace; returns the previous value
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Value for `key`, if present
    pub fn lookup<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn lookup_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    /// Value for `key`, or `KeyNotFound` naming the key
    pub fn get<Q>(&self, key: &Q) -> Result<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        self.entries
            .get(key)
            .ok_or_else(|| TesseraError::KeyNotFound(format!("{:?}", key)))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    pub fn keys(&self) -> hash_map::Keys<'_, K, V> {
        self.entries.keys()
    }

    pub fn values(&self) -> hash_map::Values<'_, K, V> {
        self.entries.values()
    }
}

// =============================================================================
// Encoding
// =============================================================================

impl<K, V> SerialMap<K, V>
where
    K: Eq + Hash + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Encode into a fresh buffer
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());
        for (key, value) in &self.entries {
            bincode::serialize_into(&mut *buf, key)?;
            bincode::serialize_into(&mut *buf, value)?;
        }
        Ok(())
    }

    /// Decode a map starting at `offset` in `bytes`.
    ///
    /// Returns the map and the number of bytes its encoding occupied.
    /// Truncated input and duplicate keys are rejected.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Self, usize)> {
        if offset > bytes.len() {
            return Err(TesseraError::Serialization(format!(
                "offset {} beyond buffer of {} bytes",
                offset,
                bytes.len()
            )));
        }

        let input = &bytes[offset..];
        if input.len() < COUNT_SIZE {
            return Err(TesseraError::Serialization(format!(
                "map truncated: {} bytes where the entry count needs {}",
                input.len(),
                COUNT_SIZE
            )));
        }

        let mut cursor = Cursor::new(input);
        let count: u64 = bincode::deserialize_from(&mut cursor)?;

        // Every entry takes at least one byte, so the count cannot honestly
        // exceed the remaining input
        let remaining = (input.len() - COUNT_SIZE) as u64;
        if count > remaining {
            return Err(TesseraError::Serialization(format!(
                "map claims {} entries but only {} bytes follow",
                count, remaining
            )));
        }

        let mut entries = HashMap::with_capacity(count as usize);
        for index in 0..count {
            let key: K = bincode::deserialize_from(&mut cursor)?;
            let value: V = bincode::deserialize_from(&mut cursor)?;
            if entries.insert(key, value).is_some() {
                return Err(TesseraError::Serialization(format!(
                    "duplicate key at entry {}",
                    index
                )));
            }
        }

        Ok((Self { entries }, cursor.position() as usize))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl<K: Eq + Hash, V> Default for SerialMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for SerialMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq + Hash, V: Eq> Eq for SerialMap<K, V> {}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for SerialMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for SerialMap<K, V> {
    type Item = (K, V);
    type IntoIter = hash_map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a SerialMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = hash_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
