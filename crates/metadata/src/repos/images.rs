//! Image repository trait.

use crate::error::MetadataResult;
use crate::models::{DeletedImage, ImageEntry, ImageFilter, ImageRow, ImageUpdate, NewImage};
use async_trait::async_trait;

/// Repository for images.
///
/// Every mutation that changes the size of a sample's image set also updates
/// that sample's `ImageCount` and `Metadata` before committing.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    /// Get an image row by ID.
    async fn get_image(&self, image_id: &str) -> MetadataResult<Option<ImageRow>>;

    /// List images with their owning samples, in insertion order.
    async fn list_images(&self, filter: &ImageFilter) -> MetadataResult<Vec<ImageEntry>>;

    /// Insert an image under its sample.
    /// Fails with `NotFound` if the sample is missing and `AlreadyExists` if
    /// the image id is taken.
    async fn insert_image(&self, image: &NewImage) -> MetadataResult<ImageEntry>;

    /// Replace an image's values. Ownership never changes.
    async fn update_image(&self, image_id: &str, update: &ImageUpdate)
    -> MetadataResult<ImageEntry>;

    /// Delete an image row.
    async fn delete_image(&self, image_id: &str) -> MetadataResult<DeletedImage>;
}
