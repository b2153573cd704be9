//! # Trellis Store
//!
//! Ordered, transactional key/value storage layer for the Trellis
//! Merkle skip-list.
//!
//! This crate provides:
//! - **Store traits**: [`KvStore`] and [`KvTransaction`], the minimal surface
//!   the tree needs (point lookup, ordered seek, put, delete, commit, abort)
//! - **Cursors**: [`StoreCursor`], bidirectional ordered traversal built on
//!   top of [`KvTransaction::seek`]
//! - **Memory backend**: [`MemoryStore`], snapshot-isolated readers, a single
//!   buffered writer, and named databases
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Merkle skip-list (core)        │
//! ├─────────────────────────────────────────┤
//! │     KvStore / KvTransaction traits      │
//! ├─────────────────────────────────────────┤
//! │  MemoryStore (Arc<BTreeMap> snapshots)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::ops::Bound;
//! use trellis_store::{Direction, KvStore, KvTransaction, MemoryStore, TxnMode};
//!
//! let store = MemoryStore::new();
//! let mut txn = store.begin(TxnMode::ReadWrite, None).unwrap();
//! txn.put(b"a", b"1").unwrap();
//! txn.commit().unwrap();
//!
//! let txn = store.begin(TxnMode::ReadOnly, None).unwrap();
//! let (key, _) = txn.seek(Bound::Unbounded, Direction::Forward).unwrap().unwrap();
//! assert_eq!(key.as_ref(), b"a");
//! ```

pub mod cursor;
pub mod error;
pub mod memory;

pub use cursor::StoreCursor;
pub use error::{Result, StoreError};
pub use memory::{MemoryStore, MemoryStoreConfig, MemoryTransaction};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// A raw `(key, value)` pair read from the store
pub type Entry = (Bytes, Bytes);

/// Access mode of a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnMode {
    /// Snapshot reads only
    ReadOnly,
    /// Reads plus buffered writes, published on commit
    ReadWrite,
}

impl TxnMode {
    /// Check if this mode forbids mutations
    pub fn is_read_only(self) -> bool {
        matches!(self, TxnMode::ReadOnly)
    }
}

/// Iteration direction for seeks and cursors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending key order
    #[default]
    Forward,
    /// Descending key order
    Reverse,
}

/// A transaction over one database of an ordered key/value store.
///
/// Keys are compared byte-lexicographically. Implementations must give every
/// transaction a consistent view: a read-only transaction sees the state
/// committed when it began, and a read-write transaction additionally sees its
/// own uncommitted writes.
pub trait KvTransaction: Send {
    /// The mode this transaction was opened with
    fn mode(&self) -> TxnMode;

    /// Point lookup
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Find the first entry at or past `bound` in the given direction.
    ///
    /// Going [`Direction::Forward`], `Included(k)` finds the smallest key `>= k`
    /// and `Excluded(k)` the smallest key `> k`. Going [`Direction::Reverse`],
    /// they find the largest key `<= k` and `< k` respectively.
    /// `Unbounded` finds the first (or last) entry overall.
    fn seek(&self, bound: Bound<&[u8]>, direction: Direction) -> Result<Option<Entry>>;

    /// Insert or overwrite an entry
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove an entry; fails with [`StoreError::KeyNotFound`] if absent
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Publish all buffered writes
    fn commit(self) -> Result<()>
    where
        Self: Sized;

    /// Discard all buffered writes
    fn abort(self)
    where
        Self: Sized;
}

/// A store able to open transactions over named databases
pub trait KvStore: Send + Sync + 'static {
    /// The transaction type handed out by [`KvStore::begin`]
    type Txn: KvTransaction;

    /// Open a transaction. `database` of `None` selects the default database.
    fn begin(&self, mode: TxnMode, database: Option<&str>) -> Result<Self::Txn>;

    /// Close the store; later calls to [`KvStore::begin`] fail
    fn close(&self) -> Result<()>;
}
