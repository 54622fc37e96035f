//! Sample repository trait.

use crate::error::MetadataResult;
use crate::models::{DeletedSample, NewSample, SampleRow};
use async_trait::async_trait;

/// Repository for samples.
#[async_trait]
pub trait SampleRepo: Send + Sync {
    /// Create a sample with no images and a fresh snapshot.
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create_sample(&self, sample: &NewSample) -> MetadataResult<SampleRow>;

    /// Get a sample by ID.
    async fn get_sample(&self, sample_id: i64) -> MetadataResult<Option<SampleRow>>;

    /// List all samples ordered by ID.
    async fn list_samples(&self) -> MetadataResult<Vec<SampleRow>>;

    /// Delete a sample and, by cascade, every image it owns.
    /// Returns the removed rows so their blobs can be cleaned up.
    async fn delete_sample(&self, sample_id: i64) -> MetadataResult<DeletedSample>;
}
