//! Error types for the trellis-store crate

use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Key not found (hex-encoded)
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Mutation attempted in a read-only transaction
    #[error("transaction is read-only")]
    ReadOnly,

    /// Another read-write transaction is already open
    #[error("a read-write transaction is already active")]
    WriterBusy,

    /// Named database was not declared when the store was opened
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// The store has been closed
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Build a `KeyNotFound` error for a raw key
    pub fn key_not_found(key: &[u8]) -> Self {
        StoreError::KeyNotFound(hex::encode(key))
    }
}
