//! Bidirectional ordered cursor over a transaction

use crate::{Direction, Entry, KvTransaction, Result};
use std::ops::Bound;

/// An ordered cursor built on [`KvTransaction::seek`].
///
/// The cursor holds no iterator state inside the store: every step is a fresh
/// seek relative to the current key, so it stays valid while the owning
/// transaction is not mutated underneath it.
pub struct StoreCursor<'t, T: KvTransaction> {
    txn: &'t T,
    direction: Direction,
    current: Option<Entry>,
}

impl<'t, T: KvTransaction> StoreCursor<'t, T> {
    /// Open a cursor positioned at the first entry at or past `bound`
    pub fn open(txn: &'t T, direction: Direction, bound: Bound<&[u8]>) -> Result<Self> {
        let current = txn.seek(bound, direction)?;
        Ok(Self {
            txn,
            direction,
            current,
        })
    }

    /// Direction that [`StoreCursor::next`] moves in
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The entry under the cursor, if positioned
    pub fn entry(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    /// Reposition at the first entry at or past `key` in the cursor's direction
    pub fn seek(&mut self, key: &[u8]) -> Result<Option<Entry>> {
        self.current = self.txn.seek(Bound::Included(key), self.direction)?;
        Ok(self.current.clone())
    }

    /// Step once in the cursor's direction
    pub fn next(&mut self) -> Result<Option<Entry>> {
        self.step(self.direction)
    }

    /// Step once against the cursor's direction
    pub fn previous(&mut self) -> Result<Option<Entry>> {
        let back = match self.direction {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        };
        self.step(back)
    }

    fn step(&mut self, direction: Direction) -> Result<Option<Entry>> {
        let Some((key, _)) = self.current.take() else {
            return Ok(None);
        };
        self.current = self.txn.seek(Bound::Excluded(key.as_ref()), direction)?;
        Ok(self.current.clone())
    }
}
