//! Integration tests for Trellis
//!
//! These tests drive the store, the skip-list and the managed tree together.

use proptest::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use trellis::{
    diff, ChangeType, CoreError, Key, KvStore, MemoryStore, MemoryStoreConfig, MemoryTransaction,
    SplitPredicate, Transaction, Tree, TreeConfig, TxnMode,
};

fn build<'a>(entries: impl IntoIterator<Item = &'a (Vec<u8>, Vec<u8>)>) -> MemoryStore {
    let store = MemoryStore::new();
    let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();
    for (key, value) in entries {
        txn.set(key, value).unwrap();
    }
    txn.commit().unwrap();
    store
}

fn read(store: &MemoryStore) -> Transaction<MemoryTransaction> {
    Transaction::begin(store, TxnMode::ReadOnly, None).unwrap()
}

fn abc() -> Vec<(Vec<u8>, Vec<u8>)> {
    vec![
        (b"a".to_vec(), b"foo".to_vec()),
        (b"b".to_vec(), b"bar".to_vec()),
        (b"c".to_vec(), b"baz".to_vec()),
    ]
}

/// Test the reference scenarios on a managed tree
#[test_log::test(tokio::test)]
async fn test_golden_scenarios() {
    let tree = Tree::open(MemoryStore::new(), TreeConfig::default()).unwrap();

    let root = tree.read(|txn| txn.get_root()).unwrap();
    assert_eq!((root.level, root.key), (0, Key::Anchor));
    assert_eq!(root.hash.to_hex(), "af1349b9f5f9a1a6a0404dea36dcc949");

    tree.write(|txn| {
        for (key, value) in abc() {
            txn.set(&key, &value)?;
        }
        Ok(())
    })
    .await
    .unwrap();

    tree.read(|txn| {
        let root = txn.get_root()?;
        assert_eq!((root.level, &root.key), (1, &Key::Anchor));
        assert_eq!(root.hash.to_hex(), "6246b94074d09feb644be1a1c12c1f50");

        let leaf = txn.get_node(0, &Key::entry(b"a"))?;
        assert_eq!(leaf.hash.to_hex(), "2f26b85f65eb9f7a8ac11e79e710148d");
        assert_eq!(leaf.value.as_deref(), Some(&b"foo"[..]));

        let children: Vec<Key> = txn
            .get_children(1, &Key::Anchor)?
            .into_iter()
            .map(|node| node.key)
            .collect();
        assert_eq!(
            children,
            vec![Key::Anchor, Key::entry(b"a"), Key::entry(b"b"), Key::entry(b"c")]
        );
        Ok(())
    })
    .unwrap();

    tree.write(|txn| {
        txn.delete(b"a")?;
        txn.delete(b"b")?;
        txn.delete(b"c")
    })
    .await
    .unwrap();

    let root = tree.read(|txn| txn.get_root()).unwrap();
    assert_eq!(root.level, 0);
    assert_eq!(root.hash.to_hex(), "af1349b9f5f9a1a6a0404dea36dcc949");

    tree.close().await.unwrap();
}

/// Test that a single entry can be added and removed again
#[test]
fn test_single_entry_round_trip() {
    let store = MemoryStore::new();
    let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();
    let empty = txn.get_root().unwrap();

    txn.set(b"only", b"entry").unwrap();
    assert_eq!(txn.get_root().unwrap().level, 1);

    txn.delete(b"only").unwrap();
    assert_eq!(txn.get_root().unwrap(), empty);
    txn.verify().unwrap();
    txn.commit().unwrap();
}

/// Test sequential keys with hashed values against recorded roots
#[test]
fn test_sequential_roots() {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..1000u16)
        .map(|i| {
            let key = i.to_be_bytes().to_vec();
            let value = Sha256::digest(&key).to_vec();
            (key, value)
        })
        .collect();

    let store = build(&entries[..100]);
    let root = read(&store).get_root().unwrap();
    assert_eq!(root.level, 3);
    assert_eq!(root.hash.to_hex(), "8efd6f7622e2bd0e52acc713056eb330");

    let store = build(&entries);
    let txn = read(&store);
    let root = txn.get_root().unwrap();
    assert_eq!(root.level, 2);
    assert_eq!(root.hash.to_hex(), "d2c129466864bde37dcfa47488fe111f");
    txn.verify().unwrap();

    let stats = txn.stats().unwrap();
    assert_eq!(stats.entries, 1000);
    assert_eq!(stats.nodes_per_level.len(), 3);
    assert_eq!(stats.nodes_per_level[2], 1);
}

/// Test walking a tree from the root down to a leaf and along its level
#[test]
fn test_cursor_walk() {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..300u16)
        .map(|i| (i.to_be_bytes().to_vec(), vec![1]))
        .collect();
    let store = build(&entries);
    let txn = read(&store);
    let mut cursor = txn.cursor();

    let root = cursor.go_to_root().unwrap();
    let mut level = root.level;
    let mut key = root.key;
    while level > 0 {
        let children = txn.get_children(level, &key).unwrap();
        let last = children.last().cloned().unwrap();
        level = last.level;
        key = last.key;
    }

    // The right-most descent ends on the last entry
    let leaf = cursor.go_to_node(0, &key).unwrap();
    assert_eq!(leaf.key, Key::entry(&299u16.to_be_bytes()));
    assert_eq!(cursor.go_to_next().unwrap(), None);

    let previous = cursor.go_to_previous().unwrap().unwrap();
    assert_eq!(previous.key, Key::entry(&298u16.to_be_bytes()));
}

/// Test that a tree is rebuilt from scratch by `reset`
#[test]
fn test_reset() {
    let store = build(&abc());
    let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();
    txn.reset().unwrap();
    txn.commit().unwrap();

    let txn = read(&store);
    assert_eq!(txn.get_root().unwrap().level, 0);
    assert_eq!(txn.get(b"a").unwrap(), None);
    assert_eq!(store.len(None).unwrap(), 1);
}

/// Test that userdata is kept apart from the tree
#[test_log::test(tokio::test)]
async fn test_userdata_outlives_reset() {
    let tree = Tree::open(MemoryStore::new(), TreeConfig::default()).unwrap();
    tree.write(|txn| {
        txn.set_userdata(br#"{"schema":1}"#)?;
        txn.set(b"a", b"foo")?;
        txn.set(b"b", b"bar")?;
        txn.set(b"c", b"baz")
    })
    .await
    .unwrap();

    let root = tree.read(|txn| txn.get_root()).unwrap();
    assert_eq!(root.hash.to_hex(), "6246b94074d09feb644be1a1c12c1f50");

    tree.write(|txn| txn.reset()).await.unwrap();
    let (root, userdata) = tree
        .read(|txn| Ok((txn.get_root()?, txn.get_userdata()?)))
        .unwrap();
    assert_eq!(root.level, 0);
    assert_eq!(userdata.as_deref(), Some(&br#"{"schema":1}"#[..]));
}

/// Test that a tree refuses a branching factor below 2
#[test]
fn test_degenerate_branching_factor() {
    let config = TreeConfig::default().with_branching_factor(1);
    assert!(matches!(
        Tree::open(MemoryStore::new(), config),
        Err(CoreError::InvalidArgument(_))
    ));
}

/// Test concurrent writers and a diff between named databases
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_named_database_diff() {
    let store = MemoryStore::with_config(
        MemoryStoreConfig::default()
            .with_database("left")
            .with_database("right"),
    );
    let config = TreeConfig::default()
        .with_database("left")
        .with_database("right");
    let tree = Arc::new(Tree::open(store, config).unwrap());

    let mut handles = Vec::new();
    for database in ["left", "right"] {
        for i in 0..50u8 {
            let tree = Arc::clone(&tree);
            handles.push(tokio::spawn(async move {
                tree.write_in(Some(database), move |txn| txn.set(&[i], &[i])).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    tree.write_in(Some("right"), |txn| {
        txn.delete(&[7])?;
        txn.set(&[9], b"changed")
    })
    .await
    .unwrap();

    let changes = tree
        .read_in(Some("left"), |left| {
            tree.read_in(Some("right"), |right| diff(left, right))
        })
        .unwrap();

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_type, ChangeType::Remove);
    assert_eq!(&changes[0].key[..], &[7]);
    assert_eq!(changes[1].change_type, ChangeType::Modify);
    assert_eq!(changes[1].new_value.as_deref(), Some(&b"changed"[..]));

    tree.close().await.unwrap();
    assert!(matches!(
        tree.write(|txn| txn.set(b"late", b"x")).await,
        Err(CoreError::Cancelled)
    ));
}

fn entry_set() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::btree_map(
        prop::collection::vec(any::<u8>(), 1..6),
        prop::collection::vec(any::<u8>(), 0..6),
        0..120,
    )
    .prop_map(|map| map.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Insertion order never changes the root
    #[test]
    fn prop_order_independent(
        (sorted, shuffled) in entry_set()
            .prop_flat_map(|entries| (Just(entries.clone()), Just(entries).prop_shuffle()))
    ) {
        let a = read(&build(&sorted)).get_root().unwrap();
        let b = read(&build(&shuffled)).get_root().unwrap();
        prop_assert_eq!(a, b);
    }

    /// Random edits keep every invariant and match a fresh build
    #[test]
    fn prop_edits_match_rebuild(
        initial in entry_set(),
        edits in prop::collection::vec((0u8..40, prop::option::of(any::<u8>())), 0..80),
    ) {
        let store = build(&initial);
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = initial.into_iter().collect();

        let mut txn = Transaction::begin(&store, TxnMode::ReadWrite, None).unwrap();
        for (key, value) in edits {
            let key = vec![key];
            match value {
                Some(value) => {
                    txn.set(&key, &[value]).unwrap();
                    model.insert(key, vec![value]);
                }
                None if model.remove(&key).is_some() => txn.delete(&key).unwrap(),
                None => prop_assert!(txn.delete(&key).is_err()),
            }
        }
        txn.verify().unwrap();

        let entries: Vec<(Vec<u8>, Vec<u8>)> = txn
            .entries()
            .unwrap()
            .map(|entry| entry.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<trellis::Result<_>>()
            .unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
        prop_assert_eq!(&entries, &expected);

        let rebuilt = read(&build(&expected)).get_root().unwrap();
        prop_assert_eq!(txn.get_root().unwrap(), rebuilt);
    }

    /// Deletes at tiny fan-outs collapse several levels at once
    #[test]
    fn prop_small_fanout_deletes(
        keys in prop::collection::btree_set(any::<u16>(), 1..60),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 1..40),
        q in 2u32..=8,
    ) {
        let split = SplitPredicate::new(q).unwrap();
        let store = MemoryStore::new();
        let mut txn =
            Transaction::new(store.begin(TxnMode::ReadWrite, None).unwrap(), split).unwrap();
        let mut model: Vec<u16> = keys.into_iter().collect();
        for key in &model {
            txn.set(&key.to_be_bytes(), b"").unwrap();
        }

        for index in removals {
            if model.is_empty() {
                break;
            }
            let key = model.remove(index.index(model.len()));
            txn.delete(&key.to_be_bytes()).unwrap();
            txn.verify().unwrap();
        }

        let fresh = MemoryStore::new();
        let mut rebuilt =
            Transaction::new(fresh.begin(TxnMode::ReadWrite, None).unwrap(), split).unwrap();
        for key in &model {
            rebuilt.set(&key.to_be_bytes(), b"").unwrap();
        }
        prop_assert_eq!(txn.get_root().unwrap(), rebuilt.get_root().unwrap());
    }
}
