//! Full structural audit of a tree

use super::hash::{anchor_hash, hash_entry, Hash, NodeHasher};
use super::key::Key;
use super::transaction::Transaction;
use crate::{CoreError, Result};
use tracing::{debug, instrument};
use trellis_store::KvTransaction;

impl<T: KvTransaction> Transaction<T> {
    /// Check every structural invariant of the tree.
    ///
    /// Each level must start with its anchor; leaf hashes must match their
    /// entries; the nodes of every level above 0 must be exactly the anchor
    /// plus the split points of the level below, each hashing its span; and
    /// the root level must hold the anchor alone.
    #[instrument(level = "debug", skip_all)]
    pub fn verify(&self) -> Result<()> {
        let root = self.get_root()?;
        let mut expected: Vec<(Key, Hash)> = Vec::new();

        for level in 0..=root.level {
            let mut spans: Vec<(Key, NodeHasher)> = Vec::new();
            let mut count = 0usize;

            for (index, node) in self.nodes(level, None, None, false)?.enumerate() {
                let node = node?;
                count += 1;

                if index == 0 && !node.is_anchor() {
                    return Err(violation(level, &node.key, "level does not start with its anchor"));
                }

                if level == 0 {
                    let leaf_hash = match (&node.key, &node.value) {
                        (Key::Anchor, None) => anchor_hash(),
                        (Key::Entry(key), Some(value)) => hash_entry(key, value),
                        _ => return Err(violation(level, &node.key, "leaf value presence is wrong")),
                    };
                    if leaf_hash != node.hash {
                        return Err(violation(level, &node.key, "leaf hash does not match its entry"));
                    }
                } else {
                    match expected.get(index) {
                        Some((key, hash)) if *key == node.key => {
                            if *hash != node.hash {
                                return Err(violation(level, &node.key, "hash does not match its span"));
                            }
                        }
                        Some((key, _)) => {
                            return Err(violation(
                                level,
                                &node.key,
                                format!("expected a node for split point {}", key),
                            ));
                        }
                        None => {
                            return Err(violation(level, &node.key, "node is not a promoted split point"));
                        }
                    }
                }

                if node.is_anchor() || self.split.is_split(&node.hash) {
                    spans.push((node.key.clone(), NodeHasher::new()));
                }
                if let Some((_, hasher)) = spans.last_mut() {
                    hasher.update(&node.hash);
                }
            }

            if level > 0 && count < expected.len() {
                return Err(violation(
                    level,
                    &expected[count].0,
                    "split point below was not promoted",
                ));
            }

            if level < root.level && count < 2 {
                return Err(violation(level, &Key::Anchor, "level below the root holds only its anchor"));
            }

            expected = spans
                .into_iter()
                .map(|(key, hasher)| (key, hasher.finalize()))
                .collect();
        }

        if root.level > 0 && expected.len() != 1 {
            return Err(violation(root.level, &Key::Anchor, "root level has split points"));
        }

        debug!(root_level = root.level, "tree verified");
        Ok(())
    }
}

fn violation(level: u8, key: &Key, reason: impl Into<String>) -> CoreError {
    CoreError::invariant("verify", level, key, reason)
}
