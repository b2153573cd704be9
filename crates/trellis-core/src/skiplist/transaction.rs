//! Tree transactions: the read surface plus `set`, `delete` and `reset`

use super::cursor::Cursor;
use super::hash::{anchor_hash, SplitPredicate};
use super::key::{
    check_level, decode_key, encode_key, is_on_level, level_upper_bound, Key, METADATA_PREFIX,
    USERDATA_KEY,
};
use super::node::Node;
use super::nodes::{Bound, Nodes};
use super::range::Range;
use super::update::Operation;
use crate::{CoreError, Result};
use bytes::Bytes;
use serde::Serialize;
use std::ops::Bound as StoreBound;
use tracing::{debug, instrument, trace, warn};
use trellis_store::{Direction, KvStore, KvTransaction, StoreError, TxnMode};

/// Shape of a tree as seen by one transaction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    /// Level of the root
    pub root_level: u8,
    /// Number of user entries
    pub entries: usize,
    /// Node count per level, anchors included
    pub nodes_per_level: Vec<usize>,
}

/// A read-only or read-write view of a tree inside one store transaction
pub struct Transaction<T: KvTransaction> {
    txn: T,
    pub(crate) split: SplitPredicate,
    poisoned: bool,
}

impl<T: KvTransaction> Transaction<T> {
    /// Begin a transaction with the default branching factor.
    ///
    /// A read-write transaction on a store that holds no tree yet writes the
    /// level-0 anchor first.
    pub fn begin<S>(store: &S, mode: TxnMode, database: Option<&str>) -> Result<Self>
    where
        S: KvStore<Txn = T>,
    {
        Self::new(store.begin(mode, database)?, SplitPredicate::default())
    }

    /// Wrap an open store transaction
    pub fn new(txn: T, split: SplitPredicate) -> Result<Self> {
        let mut txn = Self {
            txn,
            split,
            poisoned: false,
        };
        if !txn.is_read_only() {
            txn.initialize()?;
        }
        Ok(txn)
    }

    /// The mode this transaction was opened with
    pub fn mode(&self) -> TxnMode {
        self.txn.mode()
    }

    /// Check if this transaction forbids mutations
    pub fn is_read_only(&self) -> bool {
        self.txn.mode().is_read_only()
    }

    /// Check if a mutation failed part-way in this transaction
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Publish all changes. Fails with `ReadOnlyViolation` for read-only
    /// transactions, and aborts with `TransactionPoisoned` if a mutation failed.
    #[instrument(level = "debug", skip_all)]
    pub fn commit(self) -> Result<()> {
        if self.poisoned {
            warn!("aborting poisoned transaction");
            self.txn.abort();
            return Err(CoreError::TransactionPoisoned);
        }
        if self.is_read_only() {
            self.txn.abort();
            return Err(CoreError::ReadOnlyViolation);
        }
        self.txn.commit()?;
        Ok(())
    }

    /// Discard all changes
    pub fn abort(self) {
        self.txn.abort();
    }

    // ---- reads ----

    /// Point lookup of a user entry
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if key.is_empty() {
            return Ok(None);
        }
        Ok(self.find_node(0, &Key::entry(key))?.and_then(|node| node.value))
    }

    /// Exact node lookup; fails with `NotFound` if absent
    pub fn get_node(&self, level: u8, key: &Key) -> Result<Node> {
        check_level(level)?;
        self.find_node(level, key)?
            .ok_or_else(|| CoreError::not_found(level, key))
    }

    /// The root: the anchor of the highest level.
    ///
    /// A database no read-write transaction has touched yet reads as the
    /// empty tree.
    pub fn get_root(&self) -> Result<Node> {
        let metadata = [METADATA_PREFIX];
        let Some((raw_key, raw_value)) = self
            .txn
            .seek(StoreBound::Excluded(&metadata), Direction::Reverse)?
        else {
            return Ok(Node::inner(0, Key::Anchor, anchor_hash()));
        };

        let root = Node::decode(&raw_key, &raw_value)?;
        if !root.is_anchor() {
            return Err(CoreError::invariant(
                "get_root",
                root.level,
                &root.key,
                "highest level does not consist of its anchor alone",
            ));
        }
        Ok(root)
    }

    /// Children of `(level, key)`: the span starting at `(level - 1, key)`
    pub fn get_children(&self, level: u8, key: &Key) -> Result<Vec<Node>> {
        if level == 0 {
            return Err(CoreError::InvalidArgument(
                "level 0 nodes have no children".to_string(),
            ));
        }
        self.get_node(level, key)?;
        self.span(level - 1, key, "get_children")?.collect()
    }

    /// Span iteration starting at `(level, start)`
    pub fn range(&self, level: u8, start: &Key) -> Result<Range<'_, T>> {
        check_level(level)?;
        Range::new(&self.txn, level, start, self.split)
    }

    /// First node of `level` with key at or after `key` (`None` for the
    /// start of the level)
    pub fn seek(&self, level: u8, key: Option<&[u8]>) -> Result<Option<Node>> {
        check_level(level)?;
        let start = key.map_or(Key::Anchor, Key::entry);
        let raw = encode_key(level, &start);
        self.node_at(self.txn.seek(StoreBound::Included(&raw), Direction::Forward)?, level)
    }

    /// Nodes of `level` between optional bounds, in either direction
    pub fn nodes(
        &self,
        level: u8,
        lower: Option<Bound>,
        upper: Option<Bound>,
        reverse: bool,
    ) -> Result<Nodes<'_, T>> {
        check_level(level)?;
        Nodes::new(&self.txn, level, lower, upper, reverse)
    }

    /// A cursor over this transaction
    pub fn cursor(&self) -> Cursor<'_, T> {
        Cursor::new(self)
    }

    /// All user entries in key order
    pub fn entries(&self) -> Result<impl Iterator<Item = Result<(Bytes, Bytes)>> + '_> {
        let leaves = self.nodes(0, Some(Bound::exclusive(Key::Anchor)), None, false)?;
        Ok(leaves.map(|node| {
            let node = node?;
            match (node.key, node.value) {
                (Key::Entry(key), Some(value)) => Ok((key, value)),
                (key, _) => Err(CoreError::invariant("entries", 0, &key, "leaf without a value")),
            }
        }))
    }

    /// Opaque per-tree userdata, if any has been set
    pub fn get_userdata(&self) -> Result<Option<Bytes>> {
        Ok(self.txn.get(USERDATA_KEY)?)
    }

    /// Count nodes on every level
    pub fn stats(&self) -> Result<TreeStats> {
        let mut stats = TreeStats::default();
        let mut next = self.txn.seek(StoreBound::Unbounded, Direction::Forward)?;

        while let Some((raw_key, _)) = next {
            if is_metadata(&raw_key) {
                break;
            }
            let (level, _) = decode_key(&raw_key)?;
            let level_index = usize::from(level);
            if stats.nodes_per_level.len() <= level_index {
                stats.nodes_per_level.resize(level_index + 1, 0);
            }
            stats.nodes_per_level[level_index] += 1;
            stats.root_level = level;
            next = self
                .txn
                .seek(StoreBound::Excluded(raw_key.as_ref()), Direction::Forward)?;
        }

        stats.entries = stats.nodes_per_level.first().map_or(0, |n| n.saturating_sub(1));
        Ok(stats)
    }

    // ---- writes ----

    /// Insert or overwrite an entry
    #[instrument(level = "debug", skip_all, fields(key = %hex::encode(key)))]
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        validate_key(key)?;
        validate_length("value", value.len())?;

        if let Some(existing) = self.find_node(0, &Key::entry(key))? {
            if existing.value.as_deref() == Some(value) {
                trace!("value unchanged");
                return Ok(());
            }
        }

        self.mutate(&Operation::Set {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
        })
    }

    /// Remove an entry; fails with `NotFound` without touching the tree if absent
    #[instrument(level = "debug", skip_all, fields(key = %hex::encode(key)))]
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        validate_key(key)?;

        let leaf = Key::entry(key);
        if self.find_node(0, &leaf)?.is_none() {
            return Err(CoreError::not_found(0, &leaf));
        }

        self.mutate(&Operation::Delete {
            key: Bytes::copy_from_slice(key),
        })
    }

    /// Remove every entry, leaving only the level-0 anchor. Userdata is kept.
    #[instrument(level = "debug", skip_all)]
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_writable()?;

        let mut removed = 0usize;
        let mut last: Option<Bytes> = None;
        loop {
            let bound = match &last {
                Some(raw) => StoreBound::Excluded(raw.as_ref()),
                None => StoreBound::Unbounded,
            };
            let Some((raw_key, _)) = self.txn.seek(bound, Direction::Forward)? else {
                break;
            };
            if is_metadata(&raw_key) {
                break;
            }
            self.txn.delete(&raw_key)?;
            removed += 1;
            last = Some(raw_key);
        }

        self.initialize()?;
        debug!(removed, "tree reset");
        Ok(())
    }

    /// Replace the per-tree userdata. It lives outside the node keyspace and
    /// never contributes to a hash.
    pub fn set_userdata(&mut self, userdata: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.txn.put(USERDATA_KEY, userdata)?;
        trace!(len = userdata.len(), "userdata set");
        Ok(())
    }

    fn mutate(&mut self, operation: &Operation) -> Result<()> {
        self.apply(operation).inspect_err(|e| {
            warn!(error = %e, "mutation failed, poisoning transaction");
            self.poisoned = true;
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(CoreError::ReadOnlyViolation);
        }
        if self.poisoned {
            return Err(CoreError::TransactionPoisoned);
        }
        Ok(())
    }

    /// Write the level-0 anchor if the tree is empty
    fn initialize(&mut self) -> Result<()> {
        if self.find_node(0, &Key::Anchor)?.is_none() {
            self.put_node(&Node::inner(0, Key::Anchor, anchor_hash()))?;
            debug!("initialized empty tree");
        }
        Ok(())
    }

    // ---- node primitives shared with the update engine ----

    pub(crate) fn find_node(&self, level: u8, key: &Key) -> Result<Option<Node>> {
        if check_level(level).is_err() {
            return Ok(None);
        }
        let raw_key = encode_key(level, key);
        match self.txn.get(&raw_key)? {
            Some(raw_value) => Ok(Some(Node::decode(&raw_key, &raw_value)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put_node(&mut self, node: &Node) -> Result<()> {
        self.txn.put(&node.raw_key(), &node.raw_value())?;
        Ok(())
    }

    pub(crate) fn delete_node(&mut self, level: u8, key: &Key) -> Result<()> {
        match self.txn.delete(&encode_key(level, key)) {
            Ok(()) => Ok(()),
            Err(StoreError::KeyNotFound(_)) => Err(CoreError::invariant(
                "delete_node",
                level,
                key,
                "node is missing",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Span iteration for internal callers, where a missing start node means
    /// the tree is corrupt
    pub(crate) fn span(
        &self,
        level: u8,
        start: &Key,
        operation: &'static str,
    ) -> Result<Range<'_, T>> {
        self.range(level, start).map_err(|e| match e {
            CoreError::NotFound { level, key } => CoreError::InvariantViolation {
                operation,
                level,
                key,
                reason: "span start is missing".to_string(),
            },
            other => other,
        })
    }

    pub(crate) fn next_node(&self, level: u8, key: &Key) -> Result<Option<Node>> {
        let raw = encode_key(level, key);
        self.node_at(self.txn.seek(StoreBound::Excluded(&raw), Direction::Forward)?, level)
    }

    pub(crate) fn previous_node(&self, level: u8, key: &Key) -> Result<Option<Node>> {
        let raw = encode_key(level, key);
        self.node_at(self.txn.seek(StoreBound::Excluded(&raw), Direction::Reverse)?, level)
    }

    pub(crate) fn last_node(&self, level: u8) -> Result<Option<Node>> {
        let entry = match level_upper_bound(level) {
            Some(end) => self.txn.seek(StoreBound::Excluded(&end), Direction::Reverse)?,
            None => self.txn.seek(StoreBound::Unbounded, Direction::Reverse)?,
        };
        self.node_at(entry, level)
    }

    fn node_at(&self, entry: Option<(Bytes, Bytes)>, level: u8) -> Result<Option<Node>> {
        match entry {
            Some((raw_key, raw_value)) if is_on_level(&raw_key, level) => {
                Ok(Some(Node::decode(&raw_key, &raw_value)?))
            }
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(CoreError::InvalidArgument(
            "keys must not be empty".to_string(),
        ));
    }
    validate_length("key", key.len())
}

/// Leaf hashes prefix lengths as `u32`
fn validate_length(what: &str, len: usize) -> Result<()> {
    if u32::try_from(len).is_err() {
        return Err(CoreError::InvalidArgument(format!(
            "{} of {} bytes exceeds the 4 GiB limit",
            what, len
        )));
    }
    Ok(())
}

fn is_metadata(raw_key: &[u8]) -> bool {
    raw_key.first() == Some(&METADATA_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skiplist::hash::hash_entry;
    use crate::skiplist::key::MAX_LEVEL;
    use trellis_store::{MemoryStore, MemoryTransaction};

    fn write(store: &MemoryStore) -> Transaction<MemoryTransaction> {
        Transaction::begin(store, TxnMode::ReadWrite, None).unwrap()
    }

    #[test]
    fn test_empty_tree() {
        let store = MemoryStore::new();
        let txn = write(&store);

        let root = txn.get_root().unwrap();
        assert_eq!(root.level, 0);
        assert_eq!(root.key, Key::Anchor);
        assert_eq!(root.hash.to_hex(), "af1349b9f5f9a1a6a0404dea36dcc949");
        assert_eq!(root.value, None);
    }

    #[test]
    fn test_abc() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        txn.set(b"a", b"foo").unwrap();
        txn.set(b"b", b"bar").unwrap();
        txn.set(b"c", b"baz").unwrap();

        let root = txn.get_root().unwrap();
        assert_eq!(root.level, 1);
        assert_eq!(root.hash.to_hex(), "6246b94074d09feb644be1a1c12c1f50");

        let leaf = txn.get_node(0, &Key::entry(b"a")).unwrap();
        assert_eq!(leaf.hash, hash_entry(b"a", b"foo"));
        assert_eq!(leaf.hash.to_hex(), "2f26b85f65eb9f7a8ac11e79e710148d");
        assert_eq!(leaf.value, Some(Bytes::from_static(b"foo")));

        let children = txn.get_children(1, &Key::Anchor).unwrap();
        let keys: Vec<Key> = children.into_iter().map(|node| node.key).collect();
        assert_eq!(
            keys,
            vec![Key::Anchor, Key::entry(b"a"), Key::entry(b"b"), Key::entry(b"c")]
        );
    }

    #[test]
    fn test_get_and_overwrite() {
        let store = MemoryStore::new();
        let mut txn = write(&store);

        txn.set(b"a", b"foo").unwrap();
        assert_eq!(txn.get(b"a").unwrap(), Some(Bytes::from_static(b"foo")));

        txn.set(b"a", b"bar").unwrap();
        assert_eq!(txn.get(b"a").unwrap(), Some(Bytes::from_static(b"bar")));
        assert_eq!(txn.get(b"b").unwrap(), None);
    }

    #[test]
    fn test_delete_last_entry_restores_empty_tree() {
        let store = MemoryStore::new();
        let mut txn = write(&store);

        txn.set(b"a", b"foo").unwrap();
        assert_eq!(txn.get_root().unwrap().level, 1);

        txn.delete(b"a").unwrap();
        let root = txn.get_root().unwrap();
        assert_eq!(root.level, 0);
        assert_eq!(root.hash, anchor_hash());
        assert_eq!(txn.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_delete_missing_key() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        txn.set(b"a", b"foo").unwrap();
        let before = txn.get_root().unwrap();

        assert!(matches!(
            txn.delete(b"b"),
            Err(CoreError::NotFound { level: 0, .. })
        ));
        assert_eq!(txn.get_root().unwrap(), before);
        assert!(!txn.is_poisoned());
        txn.commit().unwrap();
    }

    #[test]
    fn test_read_only_violation() {
        let store = MemoryStore::new();
        write(&store).commit().unwrap();

        let mut txn = Transaction::begin(&store, TxnMode::ReadOnly, None).unwrap();
        assert!(matches!(txn.set(b"a", b"foo"), Err(CoreError::ReadOnlyViolation)));
        assert!(matches!(txn.delete(b"a"), Err(CoreError::ReadOnlyViolation)));
        assert!(matches!(txn.reset(), Err(CoreError::ReadOnlyViolation)));
        assert!(matches!(txn.commit(), Err(CoreError::ReadOnlyViolation)));
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        assert!(matches!(txn.set(b"", b"x"), Err(CoreError::InvalidArgument(_))));
        assert_eq!(txn.get(b"").unwrap(), None);
    }

    #[test]
    fn test_get_children_errors() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        txn.set(b"a", b"foo").unwrap();

        assert!(matches!(
            txn.get_children(0, &Key::Anchor),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            txn.get_children(1, &Key::entry(b"a")),
            Err(CoreError::NotFound { level: 1, .. })
        ));
    }

    #[test]
    fn test_entries_and_stats() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        for (key, value) in [(b"c", b"3"), (b"a", b"1"), (b"b", b"2")] {
            txn.set(key, value).unwrap();
        }

        let entries: Vec<(Bytes, Bytes)> = txn.entries().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(
            entries,
            vec![
                (Bytes::from_static(b"a"), Bytes::from_static(b"1")),
                (Bytes::from_static(b"b"), Bytes::from_static(b"2")),
                (Bytes::from_static(b"c"), Bytes::from_static(b"3")),
            ]
        );

        let stats = txn.stats().unwrap();
        assert_eq!(stats.root_level, 1);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.nodes_per_level, vec![4, 1]);
    }

    #[test]
    fn test_reset() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        for i in 0..200u16 {
            txn.set(&i.to_be_bytes(), b"v").unwrap();
        }
        assert!(txn.get_root().unwrap().level > 1);

        txn.reset().unwrap();
        let root = txn.get_root().unwrap();
        assert_eq!(root.level, 0);
        assert_eq!(root.hash, anchor_hash());
        assert_eq!(txn.stats().unwrap().nodes_per_level, vec![1]);
        txn.commit().unwrap();
    }

    #[test]
    fn test_userdata() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        assert_eq!(txn.get_userdata().unwrap(), None);

        txn.set_userdata(b"ayo").unwrap();
        for i in 0..200u16 {
            txn.set(&i.to_be_bytes(), b"v").unwrap();
        }
        txn.verify().unwrap();
        assert_eq!(txn.stats().unwrap().entries, 200);

        // Userdata never reaches a hash
        let reference = MemoryStore::new();
        let mut plain = write(&reference);
        for i in 0..200u16 {
            plain.set(&i.to_be_bytes(), b"v").unwrap();
        }
        assert_eq!(txn.get_root().unwrap(), plain.get_root().unwrap());

        txn.reset().unwrap();
        assert_eq!(txn.get_userdata().unwrap(), Some(Bytes::from_static(b"ayo")));
        assert_eq!(txn.stats().unwrap().nodes_per_level, vec![1]);
        txn.commit().unwrap();

        let mut txn = Transaction::begin(&store, TxnMode::ReadOnly, None).unwrap();
        assert_eq!(txn.get_userdata().unwrap(), Some(Bytes::from_static(b"ayo")));
        assert!(matches!(
            txn.set_userdata(b"nope"),
            Err(CoreError::ReadOnlyViolation)
        ));
    }

    #[test]
    fn test_untouched_database_reads_as_empty_tree() {
        let store = MemoryStore::new();
        let txn = Transaction::begin(&store, TxnMode::ReadOnly, None).unwrap();

        let root = txn.get_root().unwrap();
        assert_eq!((root.level, root.key.clone()), (0, Key::Anchor));
        assert_eq!(root.hash, anchor_hash());
        assert_eq!(txn.get(b"a").unwrap(), None);
        txn.verify().unwrap();
        assert!(store.is_empty(None).unwrap());
    }

    #[test]
    fn test_metadata_level_rejected() {
        let store = MemoryStore::new();
        let mut txn = write(&store);
        txn.set_userdata(b"ayo").unwrap();

        assert!(matches!(
            txn.get_node(u8::MAX, &Key::entry(b"userdata")),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            txn.nodes(u8::MAX, None, None, true),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(txn.seek(u8::MAX, None), Err(CoreError::InvalidArgument(_))));
        assert_eq!(txn.seek(MAX_LEVEL, None).unwrap(), None);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_length_limit() {
        validate_length("value", u32::MAX as usize).unwrap();
        assert!(matches!(
            validate_length("value", u32::MAX as usize + 1),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_abort_discards_changes() {
        let store = MemoryStore::new();
        write(&store).commit().unwrap();

        let mut txn = write(&store);
        txn.set(b"a", b"foo").unwrap();
        txn.abort();

        let txn = Transaction::begin(&store, TxnMode::ReadOnly, None).unwrap();
        assert_eq!(txn.get(b"a").unwrap(), None);
        assert_eq!(txn.get_root().unwrap().level, 0);
    }
}
