//! # Trellis Core
//!
//! Deterministic, content-addressed Merkle skip-list layered over an ordered
//! key/value store.
//!
//! This crate provides:
//! - **Skip-list**: leveled nodes whose boundaries are chosen by their own
//!   hashes, so the structure depends only on the set of entries and never on
//!   the order they were written in
//! - **Incremental updates**: each `set`/`delete` rebuilds only the bounded
//!   neighbourhood of the changed leaf, bottom-up, growing or shrinking the
//!   root as needed
//! - **Node-level reads**: roots, children, bounded level scans and cursors
//!   for synchronisation protocols
//! - **Diff**: change lists between two trees that skip identical subtrees
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Tree (FIFO writers, snapshot reads)   │
//! ├─────────────────────────────────────────┤
//! │  Transaction: reads │ update engine     │
//! ├─────────────────────────────────────────┤
//! │  (level, key) → hash ++ value encoding  │
//! ├─────────────────────────────────────────┤
//! │        trellis-store (KvStore)          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use trellis_core::{Transaction, TxnMode};
//! use trellis_store::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();
//! txn.set(b"a", b"foo").unwrap();
//! txn.set(b"b", b"bar").unwrap();
//! txn.set(b"c", b"baz").unwrap();
//!
//! let root = txn.get_root().unwrap();
//! assert_eq!(root.level, 1);
//! assert_eq!(root.hash.to_hex(), "6246b94074d09feb644be1a1c12c1f50");
//! txn.commit().unwrap();
//! ```

pub mod diff;
pub mod error;
pub mod skiplist;

pub use diff::{diff, ChangeType, KeyValueChange};
pub use error::{CoreError, Result};
pub use skiplist::{
    Bound, Cursor, Hash, Key, Node, Nodes, Range, SplitPredicate, Transaction, Tree, TreeConfig,
    TreeStats,
};
pub use trellis_store::TxnMode;
