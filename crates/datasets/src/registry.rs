//! Dataset registry rooted at an explicit storage directory.

use crate::error::{DatasetError, DatasetResult};
use crate::store::DatasetStore;
use ldm_core::config::{AppConfig, MetadataConfig};
use ldm_core::{DatasetId, IMAGES_DIR_NAME};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Lists, provisions and opens datasets under one storage root.
///
/// Each dataset is a directory `<root>/<id>/` holding its database and an
/// `images/` directory. Provisioning is not safe to run concurrently for the
/// same id; callers serialize it.
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
    metadata: MetadataConfig,
}

impl Registry {
    /// Create a registry over `root` with default database settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata: MetadataConfig::default(),
        }
    }

    /// Create a registry from loaded application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.storage.root.clone(),
            metadata: config.metadata.clone(),
        }
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a dataset lives in, whether or not it exists yet.
    pub fn dataset_root(&self, id: &str) -> DatasetResult<PathBuf> {
        let id = DatasetId::parse(id)?;
        Ok(self.root.join(id.as_str()))
    }

    /// Whether a dataset directory exists.
    pub async fn exists(&self, id: &str) -> DatasetResult<bool> {
        let path = self.dataset_root(id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all datasets, sorted.
    ///
    /// A storage root that does not exist yet holds no datasets. Entries that
    /// are not directories or not valid dataset ids are skipped.
    pub async fn list(&self) -> DatasetResult<Vec<DatasetId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut datasets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match DatasetId::parse(name) {
                Ok(id) => datasets.push(id),
                Err(e) => tracing::debug!(error = %e, "Skipping directory under storage root"),
            }
        }

        datasets.sort();
        Ok(datasets)
    }

    /// Open an existing dataset, bringing its schema up to date.
    ///
    /// Fails with `Migration` when the recorded schema history is not one
    /// this build produced, so an incompatible dataset is never handed out.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn open(&self, id: &str) -> DatasetResult<DatasetStore> {
        let dataset_id = DatasetId::parse(id)?;
        if !self.exists(id).await? {
            return Err(DatasetError::NotFound(format!("dataset {dataset_id}")));
        }

        let store = self.open_dir(dataset_id).await?;
        // A no-op on a current schema; rejects divergent or newer history.
        if let Err(e) = store.migrate().await {
            store.close().await;
            return Err(e);
        }
        Ok(store)
    }

    /// Provision a dataset, or open it if it already exists.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn create(&self, id: &str) -> DatasetResult<DatasetStore> {
        let dataset_id = DatasetId::parse(id)?;
        if self.exists(id).await? {
            tracing::debug!("Dataset already exists");
            return self.open(id).await;
        }

        let root = self.root.join(dataset_id.as_str());
        tokio::fs::create_dir_all(root.join(IMAGES_DIR_NAME)).await?;

        let store = self.open_dir(dataset_id).await?;
        store.migrate().await?;
        tracing::info!(dataset = %store.id(), "Provisioned dataset");
        Ok(store)
    }

    async fn open_dir(&self, id: DatasetId) -> DatasetResult<DatasetStore> {
        let root = self.root.join(id.as_str());
        DatasetStore::open(id, root, &self.metadata).await
    }
}
