//! # Trellis
//!
//! Deterministic Merkle skip-lists over ordered key/value stores.
//!
//! This is a facade over the workspace crates:
//! - [`trellis_core`]: hashing, the update engine, node-level reads and diff
//! - [`trellis_store`]: the store traits and the in-memory backend

pub use trellis_core::{
    diff, skiplist, Bound, ChangeType, CoreError, Cursor, Hash, Key, KeyValueChange, Node, Result,
    SplitPredicate, Transaction, Tree, TreeConfig, TreeStats, TxnMode,
};
pub use trellis_store::{
    KvStore, KvTransaction, MemoryStore, MemoryStoreConfig, MemoryTransaction, StoreError,
};
