//! Error types for the trellis-core crate

use crate::skiplist::Key;
use thiserror::Error;
use trellis_store::StoreError;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in tree operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Exact node lookup on an absent `(level, key)`
    #[error("node not found: level {level}, key {key}")]
    NotFound { level: u8, key: Key },

    /// Caller passed an argument the operation cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Mutating call on a read-only transaction
    #[error("cannot modify the tree in a read-only transaction")]
    ReadOnlyViolation,

    /// Structural impossibility in a supposedly well-formed tree
    #[error("invariant violation during {operation} at level {level}, key {key}: {reason}")]
    InvariantViolation {
        operation: &'static str,
        level: u8,
        key: Key,
        reason: String,
    },

    /// A queued write was abandoned because the tree was closed
    #[error("write cancelled: tree is closed")]
    Cancelled,

    /// A mutation failed part-way and the transaction can only be aborted
    #[error("transaction poisoned by an earlier failed mutation")]
    TransactionPoisoned,

    /// Backing store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Build a `NotFound` error
    pub fn not_found(level: u8, key: &Key) -> Self {
        CoreError::NotFound {
            level,
            key: key.clone(),
        }
    }

    /// Build an `InvariantViolation` error
    pub fn invariant(
        operation: &'static str,
        level: u8,
        key: &Key,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvariantViolation {
            operation,
            level,
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Check if this error signals tree corruption
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, CoreError::InvariantViolation { .. })
    }
}
