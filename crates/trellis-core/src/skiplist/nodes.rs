//! Bounded iteration over the nodes of a single level

use super::key::{encode_key, is_on_level, level_upper_bound, Key};
use super::node::Node;
use crate::Result;
use std::ops::Bound as StoreBound;
use trellis_store::{Direction, KvTransaction, StoreCursor};

/// One end of a level scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bound {
    /// Key at the boundary
    pub key: Key,
    /// Whether a node with exactly this key is part of the scan
    pub inclusive: bool,
}

impl Bound {
    /// A bound that includes `key`
    pub fn inclusive(key: Key) -> Self {
        Self {
            key,
            inclusive: true,
        }
    }

    /// A bound that excludes `key`
    pub fn exclusive(key: Key) -> Self {
        Self {
            key,
            inclusive: false,
        }
    }

    fn admits_above(&self, key: &Key) -> bool {
        if self.inclusive {
            key >= &self.key
        } else {
            key > &self.key
        }
    }

    fn admits_below(&self, key: &Key) -> bool {
        if self.inclusive {
            key <= &self.key
        } else {
            key < &self.key
        }
    }
}

/// Iterator over the nodes of one level between two optional bounds,
/// ascending or descending.
pub struct Nodes<'t, T: KvTransaction> {
    cursor: StoreCursor<'t, T>,
    level: u8,
    lower: Option<Bound>,
    upper: Option<Bound>,
    reverse: bool,
    started: bool,
    done: bool,
}

impl<'t, T: KvTransaction> Nodes<'t, T> {
    pub(crate) fn new(
        txn: &'t T,
        level: u8,
        lower: Option<Bound>,
        upper: Option<Bound>,
        reverse: bool,
    ) -> Result<Self> {
        let cursor = if reverse {
            match &upper {
                Some(bound) => {
                    let raw = encode_key(level, &bound.key);
                    StoreCursor::open(txn, Direction::Reverse, store_bound(&raw, bound.inclusive))?
                }
                None => match level_upper_bound(level) {
                    Some(end) => {
                        StoreCursor::open(txn, Direction::Reverse, StoreBound::Excluded(&end))?
                    }
                    None => StoreCursor::open(txn, Direction::Reverse, StoreBound::Unbounded)?,
                },
            }
        } else {
            let start = lower.as_ref().map_or(Key::Anchor, |bound| bound.key.clone());
            let inclusive = lower.as_ref().map_or(true, |bound| bound.inclusive);
            let raw = encode_key(level, &start);
            StoreCursor::open(txn, Direction::Forward, store_bound(&raw, inclusive))?
        };

        Ok(Self {
            cursor,
            level,
            lower,
            upper,
            reverse,
            started: false,
            done: false,
        })
    }

    fn admits(&self, node: &Node) -> bool {
        if node.level != self.level {
            return false;
        }
        // Only the far bound can be crossed; the cursor starts inside the near one
        if self.reverse {
            self.lower.as_ref().map_or(true, |b| b.admits_above(&node.key))
        } else {
            self.upper.as_ref().map_or(true, |b| b.admits_below(&node.key))
        }
    }
}

fn store_bound(raw: &[u8], inclusive: bool) -> StoreBound<&[u8]> {
    if inclusive {
        StoreBound::Included(raw)
    } else {
        StoreBound::Excluded(raw)
    }
}

impl<T: KvTransaction> Iterator for Nodes<'_, T> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let entry = if self.started {
            self.cursor.next()
        } else {
            self.started = true;
            Ok(self.cursor.entry().cloned())
        };

        let node = match entry {
            Ok(Some((key, value))) if is_on_level(&key, self.level) => Node::decode(&key, &value),
            Ok(_) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e.into()),
        };

        match node {
            Ok(node) if self.admits(&node) => Some(Ok(node)),
            Ok(_) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
