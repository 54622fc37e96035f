//! Handle on one dataset: relational store, blob store and path resolver.

use crate::error::{DatasetError, DatasetResult};
use bytes::Bytes;
use ldm_core::config::MetadataConfig;
use ldm_core::{DATABASE_FILE_NAME, DatasetId, IMAGES_DIR_NAME, canonical_identifier};
use ldm_metadata::models::{
    ImageEntry, ImageFilter, ImageRow, ImageUpdate, NewImage, NewSample, SampleRow,
};
use ldm_metadata::repos::{ImageRepo, SampleRepo};
use ldm_metadata::{MetadataStore, SqliteStore};
use ldm_storage::{BlobStore, ByteStream, FilesystemBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A blob that could not be removed after its row was deleted.
///
/// The row deletion already committed; the file is left for
/// [`DatasetStore::reconcile`] to find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobWarning {
    pub image_id: String,
    pub message: String,
}

/// Result of deleting one image.
#[derive(Debug, Clone)]
pub struct ImageDeletion {
    pub image: ImageRow,
    /// The owning sample with its recomputed count and snapshot.
    pub sample: SampleRow,
    pub blob_warning: Option<BlobWarning>,
}

/// Result of deleting a sample together with its images.
#[derive(Debug, Clone)]
pub struct SampleDeletion {
    pub sample: SampleRow,
    pub images: Vec<ImageRow>,
    pub blob_warnings: Vec<BlobWarning>,
}

/// Options for [`DatasetStore::reconcile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Delete blobs that no image row refers to.
    pub remove_orphans: bool,
}

/// Differences between image rows and stored blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Blob keys with no image row.
    pub orphan_blobs: Vec<String>,
    /// Image ids with no blob. Metadata-only images are legal, so these are
    /// informational.
    pub missing_blobs: Vec<String>,
    /// Orphans actually deleted (only with `remove_orphans`).
    pub removed_orphans: Vec<String>,
}

/// Handle on one provisioned dataset.
///
/// Handles are cheap; open one per unit of work. Every image identifier
/// passed in is canonicalized before it reaches either store, so `a%2Fb`,
/// `a\b` and `a/b` name the same image.
pub struct DatasetStore {
    id: DatasetId,
    root: PathBuf,
    metadata: SqliteStore,
    blobs: FilesystemBackend,
}

impl DatasetStore {
    /// Open the dataset stored at `root` without migrating it.
    pub async fn open(
        id: DatasetId,
        root: impl Into<PathBuf>,
        config: &MetadataConfig,
    ) -> DatasetResult<Self> {
        let root = root.into();
        let metadata =
            SqliteStore::open(id.clone(), root.join(DATABASE_FILE_NAME), config).await?;
        let blobs = FilesystemBackend::new(root.join(IMAGES_DIR_NAME)).await?;

        Ok(Self {
            id,
            root,
            metadata,
            blobs,
        })
    }

    /// Dataset identifier.
    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    /// Directory holding the dataset.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the image blobs.
    pub fn images_dir(&self) -> &Path {
        self.blobs.root()
    }

    /// Apply pending schema migrations. Returns how many were applied.
    #[instrument(skip(self), fields(dataset = %self.id))]
    pub async fn migrate(&self) -> DatasetResult<usize> {
        let applied = self.metadata.migrate().await?;
        if applied > 0 {
            tracing::info!(applied, "Migrated dataset schema");
        }
        Ok(applied)
    }

    /// Current schema version.
    pub async fn schema_version(&self) -> DatasetResult<i64> {
        Ok(self.metadata.schema_version().await?)
    }

    /// Whether migrations are pending.
    pub async fn is_stale(&self) -> DatasetResult<bool> {
        Ok(self.metadata.is_stale().await?)
    }

    /// Check that both the database and the image directory are usable.
    pub async fn health_check(&self) -> DatasetResult<()> {
        self.metadata.health_check().await?;
        self.blobs.health_check().await?;
        Ok(())
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.metadata.close().await;
    }

    // =========================================================================
    // Samples
    // =========================================================================

    /// Create a sample with no images.
    #[instrument(skip(self, sample_type), fields(dataset = %self.id))]
    pub async fn create_sample(
        &self,
        sample_id: i64,
        sample_type: impl Into<String>,
    ) -> DatasetResult<SampleRow> {
        let sample = self
            .metadata
            .create_sample(&NewSample {
                sample_id,
                sample_type: sample_type.into(),
            })
            .await?;
        tracing::debug!("Created sample");
        Ok(sample)
    }

    /// Get a sample by ID.
    pub async fn get_sample(&self, sample_id: i64) -> DatasetResult<SampleRow> {
        self.metadata
            .get_sample(sample_id)
            .await?
            .ok_or_else(|| DatasetError::NotFound(format!("sample {sample_id}")))
    }

    /// All samples ordered by ID.
    pub async fn list_samples(&self) -> DatasetResult<Vec<SampleRow>> {
        Ok(self.metadata.list_samples().await?)
    }

    /// Delete a sample, its image rows, then their blobs.
    ///
    /// Blob removal is best effort: failures come back as warnings on a
    /// successful result.
    #[instrument(skip(self), fields(dataset = %self.id))]
    pub async fn delete_sample(&self, sample_id: i64) -> DatasetResult<SampleDeletion> {
        let deleted = self.metadata.delete_sample(sample_id).await?;

        let mut blob_warnings = Vec::new();
        for image in &deleted.images {
            if let Some(warning) = self.remove_blob(&image.image_id).await {
                blob_warnings.push(warning);
            }
        }

        tracing::debug!(images = deleted.images.len(), "Deleted sample");
        Ok(SampleDeletion {
            sample: deleted.sample,
            images: deleted.images,
            blob_warnings,
        })
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Query images with their owning samples.
    ///
    /// `ById` yields exactly one entry or fails with `NotFound`; the other
    /// filters may yield none.
    pub async fn get_images(&self, filter: &ImageFilter) -> DatasetResult<Vec<ImageEntry>> {
        let filter = match filter {
            ImageFilter::ById(raw) => ImageFilter::ById(canonical_identifier(raw)?),
            other => other.clone(),
        };

        let entries = self.metadata.list_images(&filter).await?;
        if let ImageFilter::ById(image_id) = &filter
            && entries.is_empty()
        {
            return Err(DatasetError::NotFound(format!("image {image_id}")));
        }
        Ok(entries)
    }

    /// Get one image with its owning sample.
    pub async fn get_image(&self, image_id: &str) -> DatasetResult<ImageEntry> {
        let mut entries = self
            .get_images(&ImageFilter::ById(image_id.to_string()))
            .await?;
        entries
            .pop()
            .ok_or_else(|| DatasetError::NotFound(format!("image {image_id}")))
    }

    /// Insert an image, optionally with its binary.
    ///
    /// The binary is written before the row is committed, so a failed write
    /// leaves no row behind. A row failure after a successful write is
    /// reported as an error; the blob it leaves is an orphan that
    /// [`reconcile`](Self::reconcile) reports.
    #[instrument(skip(self, image, binary), fields(dataset = %self.id, image_id = %image.image_id))]
    pub async fn insert_image(
        &self,
        image: NewImage,
        binary: Option<ByteStream>,
    ) -> DatasetResult<ImageEntry> {
        let image_id = canonical_identifier(&image.image_id)?;
        let image = NewImage { image_id, ..image };

        if self.metadata.get_sample(image.sample_id).await?.is_none() {
            return Err(DatasetError::NotFound(format!("sample {}", image.sample_id)));
        }
        // Checked before the blob write so an existing image's binary is
        // never overwritten by a rejected insert.
        if self.metadata.get_image(&image.image_id).await?.is_some() {
            return Err(DatasetError::Conflict(format!("image {}", image.image_id)));
        }

        let mut stored_binary = false;
        if let Some(stream) = binary {
            let size = self.blobs.save(&image.image_id, stream).await?;
            tracing::debug!(size, "Stored image binary");
            stored_binary = true;
        }

        match self.metadata.insert_image(&image).await {
            Ok(entry) => {
                tracing::debug!(image_count = entry.sample.image_count, "Inserted image");
                Ok(entry)
            }
            Err(e) => {
                if stored_binary {
                    tracing::warn!(error = %e, "Image row not committed after its binary was stored");
                }
                Err(e.into())
            }
        }
    }

    /// Replace an image's values. The owning sample never changes.
    #[instrument(skip(self, update), fields(dataset = %self.id))]
    pub async fn update_image(
        &self,
        image_id: &str,
        update: &ImageUpdate,
    ) -> DatasetResult<ImageEntry> {
        let image_id = canonical_identifier(image_id)?;
        Ok(self.metadata.update_image(&image_id, update).await?)
    }

    /// Delete an image row, then its blob.
    ///
    /// An absent blob is not an error. A blob that could not be removed is
    /// returned as a warning; the row deletion stands either way.
    #[instrument(skip(self), fields(dataset = %self.id))]
    pub async fn delete_image(&self, image_id: &str) -> DatasetResult<ImageDeletion> {
        let image_id = canonical_identifier(image_id)?;
        let deleted = self.metadata.delete_image(&image_id).await?;
        let blob_warning = self.remove_blob(&image_id).await;

        tracing::debug!(image_count = deleted.sample.image_count, "Deleted image");
        Ok(ImageDeletion {
            image: deleted.image,
            sample: deleted.sample,
            blob_warning,
        })
    }

    // =========================================================================
    // Binaries
    // =========================================================================

    /// Store or replace the binary of an existing image. Returns the size
    /// written.
    #[instrument(skip(self, data), fields(dataset = %self.id))]
    pub async fn put_image_binary(&self, image_id: &str, data: ByteStream) -> DatasetResult<u64> {
        let image_id = self.existing_image_id(image_id).await?;
        let size = self.blobs.save(&image_id, data).await?;
        tracing::debug!(size, "Stored image binary");
        Ok(size)
    }

    /// Read an image's binary into memory.
    pub async fn get_image_binary(&self, image_id: &str) -> DatasetResult<Bytes> {
        let image_id = self.existing_image_id(image_id).await?;
        Ok(self.blobs.get(&image_id).await?)
    }

    /// Stream an image's binary.
    pub async fn get_image_binary_stream(&self, image_id: &str) -> DatasetResult<ByteStream> {
        let image_id = self.existing_image_id(image_id).await?;
        Ok(self.blobs.get_stream(&image_id).await?)
    }

    /// Whether an existing image has a binary.
    pub async fn has_image_binary(&self, image_id: &str) -> DatasetResult<bool> {
        let image_id = self.existing_image_id(image_id).await?;
        Ok(self.blobs.exists(&image_id).await?)
    }

    /// Size in bytes of an image's binary.
    pub async fn image_binary_size(&self, image_id: &str) -> DatasetResult<u64> {
        let image_id = self.existing_image_id(image_id).await?;
        Ok(self.blobs.head(&image_id).await?.size)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Compare image rows with stored blobs.
    #[instrument(skip(self), fields(dataset = %self.id))]
    pub async fn reconcile(&self, options: ReconcileOptions) -> DatasetResult<ReconcileReport> {
        crate::reconcile::run(self, options).await
    }

    pub(crate) fn blobs(&self) -> &FilesystemBackend {
        &self.blobs
    }

    pub(crate) fn metadata(&self) -> &SqliteStore {
        &self.metadata
    }

    async fn existing_image_id(&self, raw: &str) -> DatasetResult<String> {
        let image_id = canonical_identifier(raw)?;
        if self.metadata.get_image(&image_id).await?.is_none() {
            return Err(DatasetError::NotFound(format!("image {image_id}")));
        }
        Ok(image_id)
    }

    async fn remove_blob(&self, image_id: &str) -> Option<BlobWarning> {
        match self.blobs.delete(image_id).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(image_id, error = %e, "Failed to remove image binary");
                Some(BlobWarning {
                    image_id: image_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for DatasetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStore")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
