//! In-memory ordered store with snapshot isolation
//!
//! Each database is an immutable `Arc<BTreeMap>`. Readers pin the map that
//! was current when they began; the single writer buffers its mutations in an
//! overlay and swaps in a new map on commit.

use crate::{Direction, Entry, KvStore, KvTransaction, Result, StoreError, TxnMode};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as KeyOrdering;
use std::collections::{BTreeMap, HashMap};
use std::iter::Peekable;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

type Table = BTreeMap<Vec<u8>, Bytes>;

/// Configuration for the memory store
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Named databases available in addition to the default one
    pub databases: Vec<String>,
}

impl MemoryStoreConfig {
    /// Declare an additional named database
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.databases.push(name.into());
        self
    }
}

struct Shared {
    tables: RwLock<HashMap<Option<String>, Arc<Table>>>,
    writer: AtomicBool,
    closed: AtomicBool,
}

/// An in-memory ordered key/value store
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create a store with only the default database
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create a store with the configured named databases
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        let mut tables = HashMap::new();
        tables.insert(None, Arc::new(Table::new()));
        for name in config.databases {
            tables.insert(Some(name), Arc::new(Table::new()));
        }

        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(tables),
                writer: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Names of the declared named databases
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .tables
            .read()
            .keys()
            .filter_map(|name| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of committed entries in a database
    pub fn len(&self, database: Option<&str>) -> Result<usize> {
        Ok(self.snapshot(database)?.len())
    }

    /// Check if a database holds no committed entries
    pub fn is_empty(&self, database: Option<&str>) -> Result<bool> {
        Ok(self.len(database)? == 0)
    }

    /// Check if the store has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn snapshot(&self, database: Option<&str>) -> Result<Arc<Table>> {
        self.shared
            .tables
            .read()
            .get(&database.map(str::to_owned))
            .cloned()
            .ok_or_else(|| StoreError::DatabaseNotFound(database.unwrap_or_default().to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    type Txn = MemoryTransaction;

    fn begin(&self, mode: TxnMode, database: Option<&str>) -> Result<MemoryTransaction> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        // The writer flag is taken before the snapshot so a writer always
        // starts from the latest committed state.
        if mode == TxnMode::ReadWrite
            && self
                .shared
                .writer
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return Err(StoreError::WriterBusy);
        }

        let snapshot = match self.snapshot(database) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if mode == TxnMode::ReadWrite {
                    self.shared.writer.store(false, Ordering::Release);
                }
                return Err(e);
            }
        };

        trace!(?mode, ?database, entries = snapshot.len(), "begin transaction");

        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            database: database.map(str::to_owned),
            mode,
            snapshot,
            pending: BTreeMap::new(),
            finished: false,
        })
    }

    fn close(&self) -> Result<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!("memory store closed");
        }
        Ok(())
    }
}

/// A transaction over one database of a [`MemoryStore`]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    database: Option<String>,
    mode: TxnMode,
    snapshot: Arc<Table>,
    /// Buffered writes; `None` marks a deletion
    pending: BTreeMap<Vec<u8>, Option<Bytes>>,
    finished: bool,
}

impl MemoryTransaction {
    /// Name of the database this transaction is bound to
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Number of buffered writes
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            if self.mode == TxnMode::ReadWrite {
                self.shared.writer.store(false, Ordering::Release);
            }
        }
    }
}

impl KvTransaction for MemoryTransaction {
    fn mode(&self) -> TxnMode {
        self.mode
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(value.clone());
        }
        Ok(self.snapshot.get(key).cloned())
    }

    fn seek(&self, bound: Bound<&[u8]>, direction: Direction) -> Result<Option<Entry>> {
        let range = match direction {
            Direction::Forward => (bound, Bound::Unbounded),
            Direction::Reverse => (Bound::Unbounded, bound),
        };

        let base = self.snapshot.range::<[u8], _>(range);
        let pending = self.pending.range::<[u8], _>(range);

        let entry = match direction {
            Direction::Forward => merge_first(base.peekable(), pending.peekable(), direction),
            Direction::Reverse => {
                merge_first(base.rev().peekable(), pending.rev().peekable(), direction)
            }
        };

        Ok(entry)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.pending
            .insert(key.to_vec(), Some(Bytes::copy_from_slice(value)));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        if self.get(key)?.is_none() {
            return Err(StoreError::key_not_found(key));
        }
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        self.ensure_writable()?;

        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();

        // Release our own reference first so the table is only cloned when a
        // reader still holds the previous snapshot.
        drop(std::mem::take(&mut self.snapshot));

        {
            let mut tables = self.shared.tables.write();
            let table = tables.get_mut(&self.database).ok_or_else(|| {
                StoreError::DatabaseNotFound(self.database.clone().unwrap_or_default())
            })?;

            if !pending.is_empty() {
                let table = Arc::make_mut(table);
                for (key, value) in pending {
                    match value {
                        Some(value) => {
                            table.insert(key, value);
                        }
                        None => {
                            table.remove(&key);
                        }
                    }
                }
            }
        }

        self.finish();
        debug!(database = ?self.database, writes = count, "transaction committed");
        Ok(())
    }

    fn abort(mut self) {
        if self.mode == TxnMode::ReadWrite {
            trace!(database = ?self.database, discarded = self.pending.len(), "transaction aborted");
        }
        self.pending.clear();
        self.finish();
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Return the first visible entry from the committed snapshot merged with
/// the write overlay, both already positioned and oriented in `direction`.
fn merge_first<'a, B, P>(
    mut base: Peekable<B>,
    mut pending: Peekable<P>,
    direction: Direction,
) -> Option<Entry>
where
    B: Iterator<Item = (&'a Vec<u8>, &'a Bytes)>,
    P: Iterator<Item = (&'a Vec<u8>, &'a Option<Bytes>)>,
{
    loop {
        let order = match (base.peek(), pending.peek()) {
            (None, None) => return None,
            (Some(_), None) => KeyOrdering::Less,
            (None, Some(_)) => KeyOrdering::Greater,
            (Some((b, _)), Some((p, _))) => match direction {
                Direction::Forward => b.cmp(p),
                Direction::Reverse => p.cmp(b),
            },
        };

        match order {
            KeyOrdering::Less => {
                let (key, value) = base.next()?;
                return Some((Bytes::copy_from_slice(key), value.clone()));
            }
            // The overlay shadows the snapshot
            KeyOrdering::Equal => {
                base.next();
            }
            KeyOrdering::Greater => {}
        }

        if let Some((key, Some(value))) = pending.next() {
            return Some((Bytes::copy_from_slice(key), value.clone()));
        }
    }
}
