//! Node keys and their raw store encoding

use crate::{CoreError, Result};
use bytes::Bytes;
use std::fmt;

/// Key of a node within a level.
///
/// The anchor is the sentinel that starts every level and sorts before every
/// entry key; entry keys order byte-lexicographically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// The leftmost node of a level
    Anchor,
    /// A real key (for level > 0, the leftmost leaf key of the subtree)
    Entry(Bytes),
}

impl Key {
    /// Create an entry key by copying `key`
    pub fn entry(key: &[u8]) -> Self {
        Key::Entry(Bytes::copy_from_slice(key))
    }

    /// Check if this is the anchor
    pub fn is_anchor(&self) -> bool {
        matches!(self, Key::Anchor)
    }

    /// The key bytes, or `None` for the anchor
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Key::Anchor => None,
            Key::Entry(key) => Some(key.as_ref()),
        }
    }
}

impl From<Option<Bytes>> for Key {
    fn from(key: Option<Bytes>) -> Self {
        key.map_or(Key::Anchor, Key::Entry)
    }
}

impl From<&[u8]> for Key {
    fn from(key: &[u8]) -> Self {
        Key::entry(key)
    }
}

impl From<Bytes> for Key {
    fn from(key: Bytes) -> Self {
        Key::Entry(key)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Anchor => write!(f, "Anchor"),
            Key::Entry(key) => write!(f, "Entry({})", hex::encode(key)),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Anchor => write!(f, "<anchor>"),
            Key::Entry(key) => write!(f, "{}", hex::encode(key)),
        }
    }
}

/// Encode `(level, key)` as a raw store key: `[level] ++ key bytes`.
///
/// Byte order of the encoding keeps levels contiguous and ascending, with the
/// anchor (just `[level]`) first in each level. Entry keys must be non-empty
/// or they would collide with the anchor.
pub(crate) fn encode_key(level: u8, key: &Key) -> Vec<u8> {
    match key {
        Key::Anchor => vec![level],
        Key::Entry(bytes) => {
            let mut raw = Vec::with_capacity(1 + bytes.len());
            raw.push(level);
            raw.extend_from_slice(bytes);
            raw
        }
    }
}

/// Decode a raw store key into `(level, key)`
pub(crate) fn decode_key(raw: &[u8]) -> Result<(u8, Key)> {
    match raw.split_first() {
        None => Err(CoreError::invariant(
            "decode",
            0,
            &Key::Anchor,
            "empty raw key",
        )),
        Some((&level, [])) => Ok((level, Key::Anchor)),
        Some((&level, rest)) => Ok((level, Key::entry(rest))),
    }
}

/// Highest level a node may occupy. Raw keys starting with
/// [`METADATA_PREFIX`] hold per-tree records instead of nodes.
pub const MAX_LEVEL: u8 = u8::MAX - 1;

/// First byte of every metadata raw key; sorts after all node levels
pub(crate) const METADATA_PREFIX: u8 = u8::MAX;

/// Raw key of the opaque per-tree userdata record
pub(crate) const USERDATA_KEY: &[u8] = b"\xffuserdata";

/// First raw key strictly past every key of `level`, if one can exist
pub(crate) fn level_upper_bound(level: u8) -> Option<[u8; 1]> {
    level.checked_add(1).map(|next| [next])
}

/// Check that `raw` encodes a node of `level` without decoding it
pub(crate) fn is_on_level(raw: &[u8], level: u8) -> bool {
    raw.first() == Some(&level)
}

/// Reject levels reserved for metadata
pub(crate) fn check_level(level: u8) -> Result<()> {
    if level > MAX_LEVEL {
        return Err(CoreError::InvalidArgument(format!(
            "level {} is above the highest node level {}",
            level, MAX_LEVEL
        )));
    }
    Ok(())
}
