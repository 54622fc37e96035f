//! Dataset error types.

use ldm_metadata::MetadataError;
use ldm_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Transport-neutral classification of a [`DatasetError`].
///
/// Adapters map these to their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    NotFound,
    Conflict,
    Io,
    Migration,
    ConcurrencyConflict,
    Internal,
}

/// Dataset operation errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DatasetError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Io(_) => ErrorKind::Io,
            Self::Migration(_) => ErrorKind::Migration,
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::Database(_) | Self::Serialization(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// Stable error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Io => "io_error",
            ErrorKind::Migration => "migration_error",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl From<ldm_core::Error> for DatasetError {
    fn from(err: ldm_core::Error) -> Self {
        match err {
            ldm_core::Error::InvalidIdentifier(msg) => Self::InvalidIdentifier(msg),
            ldm_core::Error::Io(e) => Self::Io(e),
            ldm_core::Error::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<StorageError> for DatasetError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::NotFound(format!("binary for image {key}")),
            StorageError::Io(e) => Self::Io(e),
            StorageError::InvalidKey(msg) => Self::InvalidIdentifier(msg),
            StorageError::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<MetadataError> for DatasetError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(msg) => Self::NotFound(msg),
            MetadataError::AlreadyExists(msg) => Self::Conflict(msg),
            MetadataError::ConcurrencyConflict(msg) => Self::ConcurrencyConflict(msg),
            err @ (MetadataError::Migration { .. } | MetadataError::IncompatibleSchema(_)) => {
                Self::Migration(err.to_string())
            }
            MetadataError::Database(e) => Self::Database(e),
            MetadataError::Serialization(e) => Self::Serialization(e),
            MetadataError::Io(e) => Self::Io(e),
        }
    }
}

/// Result type for dataset operations.
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_layer_errors_keep_their_kind() {
        let err: DatasetError =
            ldm_core::Error::InvalidIdentifier("../x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);

        let err: DatasetError = StorageError::NotFound("i1".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: DatasetError = StorageError::InvalidKey("../x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);

        let err: DatasetError = MetadataError::AlreadyExists("sample 1".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "conflict");

        let err: DatasetError = MetadataError::IncompatibleSchema("newer".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Migration);

        let err: DatasetError = MetadataError::ConcurrencyConflict("i1".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ConcurrencyConflict).unwrap();
        assert_eq!(json, "\"concurrency_conflict\"");
    }
}
