//! Diff between two trees
//!
//! Both trees are walked top-down. A subtree is skipped as soon as the other
//! tree holds a node with the same `(level, key)` and the same hash, since
//! equal hashes imply equal entries underneath. The leaves that remain on
//! each side are merged into a change list.

use crate::skiplist::{Key, Node, Transaction};
use crate::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, instrument};
use trellis_store::KvTransaction;

/// Type of change in a diff
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// Key was added
    Add,
    /// Key was removed
    Remove,
    /// Value was modified
    Modify,
}

/// A key-value change between two tree versions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueChange<K = Bytes, V = Bytes> {
    /// The key that changed
    pub key: K,
    /// Type of change
    pub change_type: ChangeType,
    /// Old value (for Remove and Modify)
    pub old_value: Option<V>,
    /// New value (for Add and Modify)
    pub new_value: Option<V>,
}

impl<K, V> KeyValueChange<K, V> {
    /// Create an add change
    pub fn add(key: K, value: V) -> Self {
        Self {
            key,
            change_type: ChangeType::Add,
            old_value: None,
            new_value: Some(value),
        }
    }

    /// Create a remove change
    pub fn remove(key: K, value: V) -> Self {
        Self {
            key,
            change_type: ChangeType::Remove,
            old_value: Some(value),
            new_value: None,
        }
    }

    /// Create a modify change
    pub fn modify(key: K, old: V, new: V) -> Self {
        Self {
            key,
            change_type: ChangeType::Modify,
            old_value: Some(old),
            new_value: Some(new),
        }
    }
}

/// Compute the changes that turn `source` into `target`, ordered by key
#[instrument(level = "debug", skip_all)]
pub fn diff<S, T>(source: &Transaction<S>, target: &Transaction<T>) -> Result<Vec<KeyValueChange>>
where
    S: KvTransaction,
    T: KvTransaction,
{
    let mut removed = Vec::new();
    let mut walk = Walk::default();
    walk.collect(source, target, source.get_root()?, &mut removed)?;

    let mut added = Vec::new();
    walk.collect(target, source, target.get_root()?, &mut added)?;

    let changes = merge(removed, added);
    debug!(
        changes = changes.len(),
        skipped = walk.skipped,
        visited = walk.visited,
        "diff complete"
    );
    Ok(changes)
}

#[derive(Default)]
struct Walk {
    visited: usize,
    skipped: usize,
}

impl Walk {
    /// Collect the leaves of `node` that are not covered by an identical
    /// subtree in `other`
    fn collect<A, B>(
        &mut self,
        this: &Transaction<A>,
        other: &Transaction<B>,
        node: Node,
        leaves: &mut Vec<(Bytes, Bytes)>,
    ) -> Result<()>
    where
        A: KvTransaction,
        B: KvTransaction,
    {
        self.visited += 1;

        if let Some(peer) = other.find_node(node.level, &node.key)? {
            if peer.hash == node.hash {
                self.skipped += 1;
                return Ok(());
            }
        }

        if node.level == 0 {
            if let (Key::Entry(key), Some(value)) = (node.key, node.value) {
                leaves.push((key, value));
            }
            return Ok(());
        }

        for child in this.get_children(node.level, &node.key)? {
            self.collect(this, other, child, leaves)?;
        }
        Ok(())
    }
}

fn merge(source: Vec<(Bytes, Bytes)>, target: Vec<(Bytes, Bytes)>) -> Vec<KeyValueChange> {
    let mut changes = Vec::with_capacity(source.len().max(target.len()));
    let mut source = source.into_iter().peekable();
    let mut target = target.into_iter().peekable();

    loop {
        let order = match (source.peek(), target.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };

        match order {
            Ordering::Less => {
                if let Some((key, value)) = source.next() {
                    changes.push(KeyValueChange::remove(key, value));
                }
            }
            Ordering::Greater => {
                if let Some((key, value)) = target.next() {
                    changes.push(KeyValueChange::add(key, value));
                }
            }
            Ordering::Equal => {
                if let (Some((key, old)), Some((_, new))) = (source.next(), target.next()) {
                    if old != new {
                        changes.push(KeyValueChange::modify(key, old, new));
                    }
                }
            }
        }
    }

    changes
}
