//! Node digests and the split predicate

use crate::{CoreError, Result};
use std::fmt;

/// Size of a node digest in bytes (BLAKE3 truncated to 128 bits)
pub const HASH_SIZE: usize = 16;

/// A truncated BLAKE3 digest identifying a node
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a hash from raw bytes
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a hash from a slice, which must be exactly `HASH_SIZE` bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; HASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Parse a hex-encoded hash
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CoreError::InvalidArgument(format!("invalid hash hex: {}", e)))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            CoreError::InvalidArgument(format!(
                "hash must be {} bytes, got {}",
                HASH_SIZE,
                bytes.len()
            ))
        })
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Convert to a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Big-endian value of the first four bytes, compared against the split threshold
    pub fn prefix(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<blake3::Hash> for Hash {
    fn from(hash: blake3::Hash) -> Self {
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&hash.as_bytes()[..HASH_SIZE]);
        Self(bytes)
    }
}

/// Hash of a leaf entry: `u32be(len key) ++ key ++ u32be(len value) ++ value`
pub fn hash_entry(key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(key.len() as u32).to_be_bytes());
    hasher.update(key);
    hasher.update(&(value.len() as u32).to_be_bytes());
    hasher.update(value);
    hasher.finalize().into()
}

/// Hash of the level-0 anchor, the digest of the empty input
pub fn anchor_hash() -> Hash {
    NodeHasher::new().finalize()
}

/// Incremental hasher over a span of child hashes
#[derive(Default)]
pub struct NodeHasher {
    inner: blake3::Hasher,
    children: usize,
}

impl NodeHasher {
    /// Create an empty hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child hash
    pub fn update(&mut self, child: &Hash) {
        self.inner.update(child.as_bytes());
        self.children += 1;
    }

    /// Number of children absorbed so far
    pub fn children(&self) -> usize {
        self.children
    }

    /// Finish the node hash
    pub fn finalize(&self) -> Hash {
        self.inner.finalize().into()
    }
}

/// Decides split points from a target fan-out `Q`.
///
/// A hash is a split when its four-byte big-endian prefix is below
/// `floor(2^32 / Q)`, so on average one node in `Q` starts a new span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitPredicate {
    limit: u32,
}

impl SplitPredicate {
    /// Create a predicate for the given branching factor, which must be at least 2
    pub fn new(branching_factor: u32) -> Result<Self> {
        if branching_factor < 2 {
            return Err(CoreError::InvalidArgument(format!(
                "branching factor must be at least 2, got {}",
                branching_factor
            )));
        }
        Ok(Self::with_limit(branching_factor))
    }

    fn with_limit(branching_factor: u32) -> Self {
        let limit = (1u64 << 32) / u64::from(branching_factor);
        Self {
            limit: limit as u32,
        }
    }

    /// The exclusive threshold on the hash prefix
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Check if a hash is a split point
    pub fn is_split(&self, hash: &Hash) -> bool {
        hash.prefix() < self.limit
    }
}

impl Default for SplitPredicate {
    fn default() -> Self {
        Self::with_limit(super::DEFAULT_BRANCHING_FACTOR)
    }
}
