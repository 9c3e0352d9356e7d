//! Error types for Tessera
//!
//! Provides a unified error type for all operations.
//!
//! Errors fall into two classes:
//! - **Fatal**: the medium failed or its contents cannot be trusted
//!   (`Io`, `FatalIo`, `CorruptHeader`, `InvariantViolation`). The store must
//!   not be used further once one of these is returned.
//! - **Recoverable**: ordinary outcomes the caller decides on
//!   (`KeyNotFound`, `FileExists`, `InvalidArgument`, ...).
//!
//! Reads and removes that run past the end of a file are never errors; they
//! are clamped to the bytes actually present.

use thiserror::Error;

use crate::storage::BlockId;

/// Result type alias using TesseraError
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Unified error type for Tessera operations
#[derive(Debug, Error)]
pub enum TesseraError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO failure ({context}): {source}")]
    FatalIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt store header: {0}")]
    CorruptHeader(String),

    #[error("Invariant violation at block {block}: {reason}")]
    InvariantViolation { block: BlockId, reason: String },

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TesseraError {
    /// Wrap an I/O error with the block or offset it happened at
    pub fn fatal_io(context: impl Into<String>, source: std::io::Error) -> Self {
        TesseraError::FatalIo {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for an invariant violation on a given block
    pub fn invariant(block: BlockId, reason: impl Into<String>) -> Self {
        TesseraError::InvariantViolation {
            block,
            reason: reason.into(),
        }
    }

    /// Whether this error means the store can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TesseraError::Io(_)
                | TesseraError::FatalIo { .. }
                | TesseraError::CorruptHeader(_)
                | TesseraError::InvariantViolation { .. }
        )
    }
}

impl From<bincode::Error> for TesseraError {
    fn from(err: bincode::Error) -> Self {
        TesseraError::Serialization(err.to_string())
    }
}

impl From<TesseraError> for std::io::Error {
    fn from(err: TesseraError) -> Self {
        match err {
            TesseraError::Io(e) => e,
            TesseraError::FatalIo { source, .. } => source,
            TesseraError::InvalidArgument(msg) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)
            }
            TesseraError::KeyNotFound(msg) => std::io::Error::new(std::io::ErrorKind::NotFound, msg),
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
