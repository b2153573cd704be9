//! Incremental update engine
//!
//! A single `set` or `delete` descends from the root to the leaf along the
//! spans containing the key, mutates the leaf, then re-hashes bottom-up.
//! Each level reports to its parent whether the span it was asked about
//! still starts at the same key (`Update`) or lost its first child
//! (`Delete`). Nodes that became split points on the way up are collected in
//! a sibling buffer and promoted one level at a time.

use super::hash::{hash_entry, NodeHasher};
use super::key::{Key, MAX_LEVEL};
use super::node::Node;
use super::transaction::Transaction;
use crate::{CoreError, Result};
use bytes::Bytes;
use std::cmp::Ordering;
use tracing::{debug, trace};
use trellis_store::KvTransaction;

/// A single leaf mutation
#[derive(Clone, Debug)]
pub(crate) enum Operation {
    Set { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

impl Operation {
    fn key(&self) -> &Bytes {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// What a level reports about the span its parent asked it to revalidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    /// The span still starts at the same key
    Update,
    /// The span's first child is gone or no longer a split point
    Delete,
}

impl<T: KvTransaction> Transaction<T> {
    pub(crate) fn apply(&mut self, operation: &Operation) -> Result<()> {
        let mut siblings = Vec::new();
        let root = self.get_root()?;

        let outcome = if root.level == 0 {
            self.apply_leaf(&Key::Anchor, operation, &mut siblings)?
        } else {
            self.apply_node(root.level - 1, &Key::Anchor, operation, &mut siblings)?
        };

        if outcome == Outcome::Delete {
            return Err(CoreError::invariant(
                "apply",
                root.level,
                &Key::Anchor,
                "delete signal reached the root",
            ));
        }

        let mut root_level = root.level.max(1);
        self.hash_node(root_level, &Key::Anchor)?;

        while !siblings.is_empty() {
            self.promote(root_level, &mut siblings)?;
            if root_level >= MAX_LEVEL {
                return Err(CoreError::invariant(
                    "apply",
                    root_level,
                    &Key::Anchor,
                    "tree height overflow",
                ));
            }
            root_level += 1;
            self.hash_node(root_level, &Key::Anchor)?;
            debug!(level = root_level, "root grew");
        }

        while root_level > 0 {
            let last = self.last_node(root_level - 1)?.ok_or_else(|| {
                CoreError::invariant("apply", root_level - 1, &Key::Anchor, "level is empty")
            })?;
            if !last.is_anchor() {
                break;
            }
            self.delete_node(root_level, &Key::Anchor)?;
            root_level -= 1;
            debug!(level = root_level, "root shrank");
        }

        Ok(())
    }

    fn apply_leaf(
        &mut self,
        first_child: &Key,
        operation: &Operation,
        siblings: &mut Vec<Key>,
    ) -> Result<Outcome> {
        match operation {
            Operation::Set { key, value } => {
                let hash = hash_entry(key, value);
                self.put_node(&Node::leaf(key.clone(), hash, value.clone()))?;

                let leaf = Key::Entry(key.clone());
                let is_split = self.split.is_split(&hash);
                match first_child.cmp(&leaf) {
                    Ordering::Less => {
                        if is_split {
                            siblings.push(leaf);
                        }
                        Ok(Outcome::Update)
                    }
                    Ordering::Equal if is_split => Ok(Outcome::Update),
                    Ordering::Equal => Ok(Outcome::Delete),
                    Ordering::Greater => Err(CoreError::invariant(
                        "apply_leaf",
                        0,
                        &leaf,
                        "leaf sorts before the first child of its span",
                    )),
                }
            }
            Operation::Delete { key } => {
                let leaf = Key::Entry(key.clone());
                self.delete_node(0, &leaf)?;
                if *first_child == leaf {
                    Ok(Outcome::Delete)
                } else {
                    Ok(Outcome::Update)
                }
            }
        }
    }

    fn apply_node(
        &mut self,
        level: u8,
        first_child: &Key,
        operation: &Operation,
        siblings: &mut Vec<Key>,
    ) -> Result<Outcome> {
        if level == 0 {
            return self.apply_leaf(first_child, operation, siblings);
        }

        let target = self.find_target(level, first_child, operation.key())?;
        let is_left_edge = first_child.is_anchor();
        let is_first_child = target == *first_child;

        match self.apply_node(level - 1, &target, operation, siblings)? {
            Outcome::Delete => {
                if is_left_edge && is_first_child {
                    return Err(CoreError::invariant(
                        "apply_node",
                        level,
                        &target,
                        "the anchor lost its span",
                    ));
                }

                let previous = self.move_to_previous_child(level, &target)?;
                self.promote(level, siblings)?;
                let is_previous_split = self.hash_node(level, &previous)?;

                if is_first_child || previous < *first_child {
                    if is_previous_split {
                        siblings.push(previous);
                    }
                    Ok(Outcome::Delete)
                } else if previous == *first_child {
                    if is_left_edge || is_previous_split {
                        Ok(Outcome::Update)
                    } else {
                        Ok(Outcome::Delete)
                    }
                } else {
                    if is_previous_split {
                        siblings.push(previous);
                    }
                    Ok(Outcome::Update)
                }
            }
            Outcome::Update => {
                let is_target_split = self.hash_node(level, &target)?;
                self.promote(level, siblings)?;

                if is_first_child {
                    if is_target_split || is_left_edge {
                        Ok(Outcome::Update)
                    } else {
                        Ok(Outcome::Delete)
                    }
                } else {
                    if is_target_split {
                        siblings.push(target);
                    }
                    Ok(Outcome::Update)
                }
            }
        }
    }

    /// Last node in the span `(level, first_child)` whose key is at or before `key`
    fn find_target(&self, level: u8, first_child: &Key, key: &Bytes) -> Result<Key> {
        let mut target = None;
        for node in self.span(level, first_child, "find_target")? {
            let node = node?;
            if let Key::Entry(node_key) = &node.key {
                if key < node_key {
                    break;
                }
            }
            target = Some(node.key);
        }

        target.ok_or_else(|| {
            CoreError::invariant("find_target", level, first_child, "span has no target")
        })
    }

    /// Delete `(level, target)` and walk back to the nearest earlier node
    /// whose level-below counterpart is still a split, deleting the
    /// non-split nodes passed on the way. Stops at the anchor.
    ///
    /// A counterpart already removed by this operation counts as non-split:
    /// cascading merges below can leave its promoted node behind.
    fn move_to_previous_child(&mut self, level: u8, target: &Key) -> Result<Key> {
        self.delete_node(level, target)?;

        let mut position = target.clone();
        loop {
            let previous = self.previous_node(level, &position)?.ok_or_else(|| {
                CoreError::invariant(
                    "move_to_previous_child",
                    level,
                    &position,
                    "ran past the start of the level",
                )
            })?;

            if previous.is_anchor() {
                return Ok(Key::Anchor);
            }

            let child = self.find_node(level - 1, &previous.key)?;
            if child.is_some_and(|child| self.split.is_split(&child.hash)) {
                return Ok(previous.key);
            }

            trace!(level, key = %previous.key, "merging into predecessor");
            self.delete_node(level, &previous.key)?;
            position = previous.key;
        }
    }

    /// Re-hash every queued sibling at `level`; keep those that are splits
    fn promote(&mut self, level: u8, siblings: &mut Vec<Key>) -> Result<()> {
        let mut promoted = Vec::with_capacity(siblings.len());
        for key in siblings.drain(..) {
            if self.hash_node(level, &key)? {
                promoted.push(key);
            }
        }

        if !promoted.is_empty() {
            trace!(level, count = promoted.len(), "siblings promoted");
        }
        *siblings = promoted;
        Ok(())
    }

    /// Recompute `(level, key)` from its span at `level - 1` and store it;
    /// returns whether the new hash is a split
    fn hash_node(&mut self, level: u8, key: &Key) -> Result<bool> {
        let mut hasher = NodeHasher::new();
        for child in self.span(level - 1, key, "hash_node")? {
            hasher.update(&child?.hash);
        }

        let hash = hasher.finalize();
        self.put_node(&Node::inner(level, key.clone(), hash))?;
        Ok(self.split.is_split(&hash))
    }
}
