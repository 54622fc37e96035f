//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ldm_core::Error> for StorageError {
    fn from(err: ldm_core::Error) -> Self {
        match err {
            ldm_core::Error::InvalidIdentifier(msg) => Self::InvalidKey(msg),
            ldm_core::Error::Io(e) => Self::Io(e),
            ldm_core::Error::Config(msg) => Self::Config(msg),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
