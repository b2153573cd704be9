//! The node record stored for every `(level, key)`

use super::hash::{Hash, HASH_SIZE};
use super::key::{decode_key, encode_key, Key};
use crate::{CoreError, Result};
use bytes::Bytes;

/// A node of the skip-list.
///
/// Level-0 entry nodes carry the user value; anchors and every node above
/// level 0 carry only the hash of their span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Level in the skip-list, 0 for leaves
    pub level: u8,
    /// Key of the node
    pub key: Key,
    /// Leaf hash at level 0, span hash elsewhere
    pub hash: Hash,
    /// User value, present exactly on level-0 entry nodes
    pub value: Option<Bytes>,
}

impl Node {
    /// Create a level-0 entry node
    pub fn leaf(key: Bytes, hash: Hash, value: Bytes) -> Self {
        Self {
            level: 0,
            key: Key::Entry(key),
            hash,
            value: Some(value),
        }
    }

    /// Create a node that carries only a span hash
    pub fn inner(level: u8, key: Key, hash: Hash) -> Self {
        Self {
            level,
            key,
            hash,
            value: None,
        }
    }

    /// Check if this is the anchor of its level
    pub fn is_anchor(&self) -> bool {
        self.key.is_anchor()
    }

    /// Raw store key for this node
    pub(crate) fn raw_key(&self) -> Vec<u8> {
        encode_key(self.level, &self.key)
    }

    /// Raw store value: `hash ++ value`
    pub(crate) fn raw_value(&self) -> Vec<u8> {
        let value = self.value.as_deref().unwrap_or_default();
        let mut raw = Vec::with_capacity(HASH_SIZE + value.len());
        raw.extend_from_slice(self.hash.as_bytes());
        raw.extend_from_slice(value);
        raw
    }

    /// Rebuild a node from a raw store entry
    pub(crate) fn decode(raw_key: &[u8], raw_value: &[u8]) -> Result<Self> {
        let (level, key) = decode_key(raw_key)?;

        if raw_value.len() < HASH_SIZE {
            return Err(CoreError::invariant(
                "decode",
                level,
                &key,
                format!("stored value is {} bytes, shorter than a hash", raw_value.len()),
            ));
        }

        let (hash, value) = raw_value.split_at(HASH_SIZE);
        let hash = Hash::from_slice(hash)
            .ok_or_else(|| CoreError::invariant("decode", level, &key, "malformed hash"))?;

        let value = if level == 0 && !key.is_anchor() {
            Some(Bytes::copy_from_slice(value))
        } else if value.is_empty() {
            None
        } else {
            return Err(CoreError::invariant(
                "decode",
                level,
                &key,
                "value stored on a node that cannot carry one",
            ));
        };

        Ok(Self {
            level,
            key,
            hash,
            value,
        })
    }
}
