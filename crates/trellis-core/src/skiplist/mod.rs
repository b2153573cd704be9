//! Merkle skip-list over an ordered key/value store
//!
//! Every level starts with an anchor node. A node at level L+1 exists for the
//! anchor and for every level-L node whose hash is a split point, and its hash
//! covers the span of level-L nodes up to the next split. Because split points
//! are derived from content alone, two trees holding the same entries are
//! identical node for node.

mod cursor;
mod hash;
mod key;
mod node;
mod nodes;
mod range;
mod transaction;
mod tree;
mod update;
mod verify;

pub use cursor::Cursor;
pub use hash::{anchor_hash, hash_entry, Hash, NodeHasher, SplitPredicate, HASH_SIZE};
pub use key::{Key, MAX_LEVEL};
pub use node::Node;
pub use nodes::{Bound, Nodes};
pub use range::Range;
pub use transaction::{Transaction, TreeStats};
pub use tree::{Tree, TreeConfig};

/// Default target fan-out `Q`; on average one node in `Q` is a split point
pub const DEFAULT_BRANCHING_FACTOR: u32 = 32;
