//! Common test utilities and fixtures.

use ldm_core::DatasetId;
use ldm_core::config::MetadataConfig;
use ldm_metadata::models::{ImageRow, NewSample};
use ldm_metadata::{MetadataResult, MetadataStore, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A migrated dataset database that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<SqliteStore>,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestMetadata {
    /// Create a fresh, migrated database for dataset `d1`.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("ldm.db");
        let store = open(&db_path).await?;
        store.migrate().await?;

        Ok(Self {
            store: Arc::new(store),
            db_path,
            _temp_dir: temp_dir,
        })
    }

    /// Open a second handle on the same database.
    #[allow(dead_code)]
    pub async fn reopen(&self) -> MetadataResult<SqliteStore> {
        open(&self.db_path).await
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.store.pool()
    }
}

async fn open(db_path: &std::path::Path) -> MetadataResult<SqliteStore> {
    SqliteStore::open(
        DatasetId::parse("d1").expect("valid dataset id"),
        db_path,
        &MetadataConfig::default(),
    )
    .await
}

#[allow(dead_code)]
pub fn new_sample(sample_id: i64, sample_type: &str) -> NewSample {
    NewSample {
        sample_id,
        sample_type: sample_type.to_string(),
    }
}

#[allow(dead_code)]
pub fn new_image(image_id: &str, sample_id: i64) -> ImageRow {
    ImageRow {
        image_id: image_id.to_string(),
        sample_id,
        image_no: 0,
        image_code: None,
        original_filename: Some(format!("{image_id}.jpg")),
        image_scheme: Some("jpg".to_string()),
    }
}
