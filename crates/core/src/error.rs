//! Error types for Keel.

use thiserror::Error;

/// Result type alias for Keel operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Keel storage operations.
///
/// Errors raised by a backend adapter travel through the row store and the
/// index engine unchanged; nothing above the adapter rewraps them.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend cannot perform this operation.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound { name: String },
    /// Index not found.
    #[error("index not found: {name}")]
    IndexNotFound { name: String },
    /// A row or index key could not be used as given.
    #[error("invalid key {key}: {message}")]
    InvalidKey { key: String, message: String },
    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    /// A transaction is already open on this store.
    #[error("a transaction is already in progress")]
    TransactionInProgress,
    /// Commit was requested with no open transaction.
    #[error("no transaction in progress")]
    NoTransaction,
    /// Persisted data could not be interpreted.
    #[error("corrupt store: {message}")]
    Corrupt { message: String },
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Row encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates an unsupported operation error.
    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        Error::Unsupported { backend, operation }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Error::IndexNotFound { name: name.into() }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidKey {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a corrupt store error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::Corrupt {
            message: message.into(),
        }
    }
}
