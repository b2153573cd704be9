//! Span iteration: a node and its same-level followers up to the next split

use super::hash::SplitPredicate;
use super::key::{encode_key, is_on_level, Key};
use super::node::Node;
use crate::{CoreError, Result};
use std::ops::Bound as StoreBound;
use trellis_store::{Direction, KvTransaction, StoreCursor};

/// Iterator over the span starting at `(level, start)`.
///
/// Yields the start node unconditionally, then every following node of the
/// same level until (excluding) the next split point. These are exactly the
/// children of the level+1 node with the same key.
pub struct Range<'t, T: KvTransaction> {
    cursor: StoreCursor<'t, T>,
    level: u8,
    split: SplitPredicate,
    first: Option<Node>,
    done: bool,
}

impl<'t, T: KvTransaction> Range<'t, T> {
    /// Open a span; fails with `NotFound` if the start node does not exist
    pub(crate) fn new(txn: &'t T, level: u8, start: &Key, split: SplitPredicate) -> Result<Self> {
        let raw = encode_key(level, start);
        let cursor = StoreCursor::open(txn, Direction::Forward, StoreBound::Included(&raw))?;

        let first = match cursor.entry() {
            Some((key, value)) if key.as_ref() == raw.as_slice() => Node::decode(key, value)?,
            _ => return Err(CoreError::not_found(level, start)),
        };

        Ok(Self {
            cursor,
            level,
            split,
            first: Some(first),
            done: false,
        })
    }
}

impl<T: KvTransaction> Iterator for Range<'_, T> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first) = self.first.take() {
            return Some(Ok(first));
        }
        if self.done {
            return None;
        }

        let next = match self.cursor.next() {
            Ok(Some((key, value))) if is_on_level(&key, self.level) => Node::decode(&key, &value),
            Ok(_) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e.into()),
        };

        match next {
            Ok(node) if !self.split.is_split(&node.hash) => Some(Ok(node)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skiplist::hash::hash_entry;
    use crate::Transaction;
    use trellis_store::{MemoryStore, TxnMode};

    #[test]
    fn test_span_stops_before_next_split() {
        let store = MemoryStore::new();
        let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();

        // 36 ('$') is a split point with an empty value, its neighbours are not
        for key in [b"#", b"$", b"%"] {
            txn.set(key, b"").unwrap();
        }
        let split = SplitPredicate::default();
        assert!(split.is_split(&hash_entry(b"$", b"")));
        assert!(!split.is_split(&hash_entry(b"#", b"")));
        assert!(!split.is_split(&hash_entry(b"%", b"")));

        let keys: Vec<Key> = txn
            .range(0, &Key::Anchor)
            .unwrap()
            .map(|node| node.unwrap().key)
            .collect();
        assert_eq!(keys, vec![Key::Anchor, Key::entry(b"#")]);

        // The start node is yielded even though it is a split itself
        let keys: Vec<Key> = txn
            .range(0, &Key::entry(b"$"))
            .unwrap()
            .map(|node| node.unwrap().key)
            .collect();
        assert_eq!(keys, vec![Key::entry(b"$"), Key::entry(b"%")]);
    }

    #[test]
    fn test_span_does_not_cross_levels() {
        let store = MemoryStore::new();
        let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();
        txn.set(b"a", b"foo").unwrap();

        let level0: Vec<Node> = txn
            .range(0, &Key::Anchor)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(level0.len(), 2);
        assert!(level0.iter().all(|node| node.level == 0));
    }

    #[test]
    fn test_missing_start() {
        let store = MemoryStore::new();
        let txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();

        assert!(matches!(
            txn.range(0, &Key::entry(b"nope")),
            Err(CoreError::NotFound { level: 0, .. })
        ));
    }
}
