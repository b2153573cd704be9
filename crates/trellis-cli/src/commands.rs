//! Subcommand implementations
//!
//! Every command builds its trees in memory from JSON objects of
//! key/value strings and returns a serializable report.

use crate::config::{CliConfig, Encoding};
use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};
use trellis_core::{diff, ChangeType, Key, Node, Tree};
use trellis_store::{MemoryStore, MemoryStoreConfig};

const SOURCE: &str = "source";
const TARGET: &str = "target";

/// Decoded key/value entries
pub type Entries = Vec<(Vec<u8>, Vec<u8>)>;

/// A node as printed by the CLI
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub level: u8,
    /// `None` for the anchor
    pub key: Option<String>,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl NodeReport {
    fn new(node: &Node, encoding: Encoding) -> Result<Self> {
        Ok(Self {
            level: node.level,
            key: match &node.key {
                Key::Anchor => None,
                Key::Entry(key) => Some(encoding.encode(key)?),
            },
            hash: node.hash.to_hex(),
            value: encode_optional(encoding, node.value.as_deref())?,
        })
    }
}

fn encode_optional(encoding: Encoding, bytes: Option<&[u8]>) -> Result<Option<String>> {
    bytes.map(|bytes| encoding.encode(bytes)).transpose()
}

/// Output of `trellis build`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildReport {
    pub root: NodeReport,
    pub entries: usize,
    /// Every level from 0 up to the root, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<Vec<NodeReport>>>,
}

/// One line of `trellis diff` output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub key: String,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

/// Read a JSON object of key/value strings and decode it
pub fn read_entries(path: &Path, encoding: Encoding) -> Result<Entries> {
    let text = std::fs::read_to_string(path)?;
    parse_entries(&text, encoding)
}

/// Decode a JSON object of key/value strings
pub fn parse_entries(text: &str, encoding: Encoding) -> Result<Entries> {
    let object: BTreeMap<String, String> = serde_json::from_str(text)?;

    object
        .iter()
        .map(|(key, value)| {
            let key = encoding.decode(key)?;
            if key.is_empty() {
                return Err(CliError::Decode("an empty key".to_string()));
            }
            Ok((key, encoding.decode(value)?))
        })
        .collect()
}

/// Insert `entries` into a fresh in-memory tree and report its root
#[instrument(skip_all, fields(entries = entries.len(), levels = levels))]
pub async fn build(entries: Entries, config: &CliConfig, levels: bool) -> Result<BuildReport> {
    let count = entries.len();
    let tree = Tree::open(MemoryStore::new(), config.tree_config())?;

    tree.write(move |txn| {
        for (key, value) in &entries {
            txn.set(key, value)?;
        }
        Ok(())
    })
    .await?;

    let (root, nodes) = tree.read(|txn| {
        let root = txn.get_root()?;

        let nodes = if levels {
            let mut all = Vec::with_capacity(usize::from(root.level) + 1);
            for level in 0..=root.level {
                let nodes = txn
                    .nodes(level, None, None, false)?
                    .collect::<trellis_core::Result<Vec<_>>>()?;
                all.push(nodes);
            }
            Some(all)
        } else {
            None
        };
        Ok((root, nodes))
    })?;
    tree.close().await?;

    let encoding = config.encoding;
    let levels = nodes
        .map(|all| {
            all.iter()
                .map(|level| {
                    level
                        .iter()
                        .map(|node| NodeReport::new(node, encoding))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;
    let report = BuildReport {
        root: NodeReport::new(&root, encoding)?,
        entries: count,
        levels,
    };
    info!(root = %report.root.hash, level = report.root.level, "tree built");
    Ok(report)
}

/// Build both entry sets side by side and list the changes from `source`
/// to `target`
#[instrument(skip_all, fields(source = source.len(), target = target.len()))]
pub async fn diff_entries(
    source: Entries,
    target: Entries,
    config: &CliConfig,
) -> Result<Vec<ChangeReport>> {
    let store = MemoryStore::with_config(
        MemoryStoreConfig::default()
            .with_database(SOURCE)
            .with_database(TARGET),
    );
    let tree_config = config
        .tree_config()
        .with_database(SOURCE)
        .with_database(TARGET);
    let tree = Tree::open(store, tree_config)?;

    for (database, entries) in [(SOURCE, source), (TARGET, target)] {
        tree.write_in(Some(database), move |txn| {
            for (key, value) in &entries {
                txn.set(key, value)?;
            }
            Ok(())
        })
        .await?;
    }

    let changes = tree.read_in(Some(SOURCE), |source| {
        tree.read_in(Some(TARGET), |target| diff(source, target))
    })?;
    tree.close().await?;
    debug!(changes = changes.len(), "diff computed");

    let encoding = config.encoding;
    changes
        .into_iter()
        .map(|change| {
            Ok(ChangeReport {
                key: encoding.encode(&change.key)?,
                change_type: change.change_type,
                old_value: encode_optional(encoding, change.old_value.as_deref())?,
                new_value: encode_optional(encoding, change.new_value.as_deref())?,
            })
        })
        .collect()
}
