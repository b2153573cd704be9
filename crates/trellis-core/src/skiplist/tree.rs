//! Managed tree handle: serialized writers and snapshot readers

use super::hash::SplitPredicate;
use super::transaction::Transaction;
use super::DEFAULT_BRANCHING_FACTOR;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, trace};
use trellis_store::{KvStore, TxnMode};

/// Configuration for tree behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Target fan-out `Q`. Replicas that compare roots must agree on it.
    pub branching_factor: u32,
    /// Named databases to initialize in addition to the default one
    pub databases: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            databases: Vec::new(),
        }
    }
}

impl TreeConfig {
    /// Set the target fan-out
    pub fn with_branching_factor(mut self, branching_factor: u32) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    /// Declare a named database
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.databases.push(name.into());
        self
    }

    /// The split predicate for this configuration; fails when the branching
    /// factor is below 2
    pub fn split_predicate(&self) -> Result<SplitPredicate> {
        SplitPredicate::new(self.branching_factor)
    }
}

/// A Merkle skip-list over a store.
///
/// Read transactions run immediately against a snapshot and are never
/// blocked. Write transactions are queued and run one at a time in the order
/// they were submitted; each sees every earlier write.
pub struct Tree<S: KvStore> {
    store: Arc<S>,
    config: TreeConfig,
    split: SplitPredicate,
    writer: Mutex<()>,
    closed: watch::Sender<bool>,
}

impl<S: KvStore> Tree<S> {
    /// Open a tree, writing the empty-tree anchor into every configured
    /// database that does not have one yet
    #[instrument(skip_all, fields(databases = config.databases.len()))]
    pub fn open(store: S, config: TreeConfig) -> Result<Self> {
        let split = config.split_predicate()?;

        let databases = std::iter::once(None)
            .chain(config.databases.iter().map(|name| Some(name.as_str())));
        for database in databases {
            // A fresh read-write transaction writes the anchor when missing
            Transaction::new(store.begin(TxnMode::ReadWrite, database)?, split)?.commit()?;
        }

        let (closed, _) = watch::channel(false);
        info!(branching_factor = config.branching_factor, "tree opened");

        Ok(Self {
            store: Arc::new(store),
            config,
            split,
            writer: Mutex::new(()),
            closed,
        })
    }

    /// The tree configuration
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Check if `close` has been called
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Run `f` in a read-only transaction on the default database
    pub fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<S::Txn>) -> Result<R>,
    {
        self.read_in(None, f)
    }

    /// Run `f` in a read-only transaction on a named database
    pub fn read_in<R, F>(&self, database: Option<&str>, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<S::Txn>) -> Result<R>,
    {
        let mut txn =
            Transaction::new(self.store.begin(TxnMode::ReadOnly, database)?, self.split)?;
        let result = f(&mut txn);
        txn.abort();
        result
    }

    /// Queue `f` as a write transaction on the default database
    pub async fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<S::Txn>) -> Result<R>,
    {
        self.write_in(None, f).await
    }

    /// Queue `f` as a write transaction on a named database.
    ///
    /// The transaction commits when `f` returns `Ok` and aborts otherwise.
    /// Fails with `Cancelled` if the tree is closed before the write starts.
    pub async fn write_in<R, F>(&self, database: Option<&str>, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<S::Txn>) -> Result<R>,
    {
        let mut closed = self.closed.subscribe();

        let _guard = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => {
                debug!("queued write cancelled");
                return Err(CoreError::Cancelled);
            }
            guard = self.writer.lock() => guard,
        };

        if self.is_closed() {
            debug!("queued write cancelled");
            return Err(CoreError::Cancelled);
        }

        trace!(?database, "write lock acquired");
        let mut txn =
            Transaction::new(self.store.begin(TxnMode::ReadWrite, database)?, self.split)?;

        match f(&mut txn) {
            Ok(result) => {
                txn.commit()?;
                trace!(?database, "write committed");
                Ok(result)
            }
            Err(e) => {
                txn.abort();
                debug!(error = %e, "write aborted");
                Err(e)
            }
        }
    }

    /// Close the tree: cancel queued writes, wait for the running one, then
    /// close the store
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        self.closed.send_replace(true);

        let _guard = self.writer.lock().await;
        self.store.close()?;

        info!("tree closed");
        Ok(())
    }
}
