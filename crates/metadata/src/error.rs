//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("incompatible schema: {0}")]
    IncompatibleSchema(String),

    #[error("concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_names_the_step() {
        let err = MetadataError::Migration {
            version: 2,
            name: "create_image".to_string(),
            source: sqlx::Error::RowNotFound,
        };
        let msg = err.to_string();
        assert!(msg.contains("migration 2 (create_image) failed"));
    }
}
