//! Error types for the xiphos engine.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! is the [`XiphosError`] enum.

use std::io;

use thiserror::Error;

/// The main error type for xiphos operations.
#[derive(Error, Debug)]
pub enum XiphosError {
    /// I/O errors (file open, grow, map, flush).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON metadata serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema-related errors (no fields defined, duplicate field, unknown
    /// field, primary key misuse).
    #[error("Schema error: {0}")]
    Schema(String),

    /// A document id does not match the expected append cursor.
    #[error("Document id out of order: expected {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    /// A primary key is already present in the index.
    #[error("Duplicate primary key: {0}")]
    DuplicateKey(String),

    /// An index, segment, or partition that was asked for does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing-store errors (value log, offset index).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed numeric or date field value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Binary serialization error (document codec, bitmap, offset index).
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation not permitted in the current state (e.g. writing to a
    /// sealed segment, sealing twice).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias for operations that may fail with [`XiphosError`].
pub type Result<T> = std::result::Result<T, XiphosError>;

impl XiphosError {
    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        XiphosError::Schema(msg.into())
    }

    /// Create a new not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        XiphosError::NotFound(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        XiphosError::Storage(msg.into())
    }

    /// Create a new parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        XiphosError::Parse(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        XiphosError::Serialization(msg.into())
    }

    /// Create a new invalid-operation error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        XiphosError::InvalidOperation(msg.into())
    }
}
