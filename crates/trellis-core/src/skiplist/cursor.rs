//! Free-moving cursor over `(level, key)` space

use super::key::Key;
use super::node::Node;
use super::transaction::Transaction;
use crate::{CoreError, Result};
use trellis_store::KvTransaction;

/// A cursor positioned on one node of the tree.
///
/// `go_to_next` and `go_to_previous` step across the whole level and ignore
/// span boundaries, which makes the cursor suitable for full-level scans.
pub struct Cursor<'t, T: KvTransaction> {
    txn: &'t Transaction<T>,
    node: Option<Node>,
}

impl<'t, T: KvTransaction> Cursor<'t, T> {
    pub(crate) fn new(txn: &'t Transaction<T>) -> Self {
        Self { txn, node: None }
    }

    /// The node under the cursor
    pub fn current(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Move to the root
    pub fn go_to_root(&mut self) -> Result<Node> {
        let root = self.txn.get_root()?;
        self.node = Some(root.clone());
        Ok(root)
    }

    /// Move to an exact node; fails with `NotFound` and leaves the cursor
    /// untouched if it does not exist
    pub fn go_to_node(&mut self, level: u8, key: &Key) -> Result<Node> {
        let node = self.txn.get_node(level, key)?;
        self.node = Some(node.clone());
        Ok(node)
    }

    /// Step to the next node on the same level, if any
    pub fn go_to_next(&mut self) -> Result<Option<Node>> {
        let current = self.position()?;
        let next = self.txn.next_node(current.level, &current.key)?;
        if let Some(node) = &next {
            self.node = Some(node.clone());
        }
        Ok(next)
    }

    /// Step to the previous node on the same level, if any
    pub fn go_to_previous(&mut self) -> Result<Option<Node>> {
        let current = self.position()?;
        let previous = self.txn.previous_node(current.level, &current.key)?;
        if let Some(node) = &previous {
            self.node = Some(node.clone());
        }
        Ok(previous)
    }

    /// Move to the first node of `level` with key at or after `key`
    /// (`None` means the start of the level)
    pub fn seek(&mut self, level: u8, key: Option<&[u8]>) -> Result<Option<Node>> {
        let found = self.txn.seek(level, key)?;
        if let Some(node) = &found {
            self.node = Some(node.clone());
        }
        Ok(found)
    }

    fn position(&self) -> Result<&Node> {
        self.node
            .as_ref()
            .ok_or_else(|| CoreError::InvalidArgument("cursor is not positioned".to_string()))
    }
}
