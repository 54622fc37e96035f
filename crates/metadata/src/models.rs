//! Database models mapping to the dataset schema.
//!
//! Column names follow the persisted schema (`SampleID`, `ImageNO`, ...);
//! the serde names match them so transport adapters can emit rows as-is.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Samples
// =============================================================================

/// Sample record.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SampleRow {
    #[sqlx(rename = "SampleID")]
    #[serde(rename = "SampleID")]
    pub sample_id: i64,
    #[sqlx(rename = "DatasetID")]
    #[serde(rename = "DatasetID")]
    pub dataset_id: String,
    #[sqlx(rename = "SampleType")]
    #[serde(rename = "SampleType")]
    pub sample_type: String,
    /// Serialized snapshot, see [`crate::snapshot`].
    #[sqlx(rename = "Metadata")]
    #[serde(rename = "Metadata")]
    pub metadata: Option<String>,
    /// Always equal to the number of `Image` rows owned by this sample.
    #[sqlx(rename = "ImageCount")]
    #[serde(rename = "ImageCount")]
    pub image_count: i64,
}

/// Values for a new sample. The dataset id comes from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSample {
    #[serde(rename = "SampleID")]
    pub sample_id: i64,
    #[serde(rename = "SampleType")]
    pub sample_type: String,
}

/// A deleted sample together with the image rows removed with it.
#[derive(Debug, Clone)]
pub struct DeletedSample {
    pub sample: SampleRow,
    pub images: Vec<ImageRow>,
}

// =============================================================================
// Images
// =============================================================================

/// Image record.
///
/// Whether the image has a binary is not recorded here: the blob store is
/// the only source of truth for that.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ImageRow {
    /// Canonical identifier; also the blob key.
    #[sqlx(rename = "ImageID")]
    #[serde(rename = "ImageID")]
    pub image_id: String,
    #[sqlx(rename = "SampleID")]
    #[serde(rename = "SampleID")]
    pub sample_id: i64,
    #[sqlx(rename = "ImageNO")]
    #[serde(rename = "ImageNO")]
    pub image_no: i64,
    #[sqlx(rename = "ImageCode")]
    #[serde(rename = "ImageCode")]
    pub image_code: Option<String>,
    /// Name of the uploaded file. Provenance only; never used for storage.
    #[sqlx(rename = "OriginalFilename")]
    #[serde(rename = "OriginalFilename")]
    pub original_filename: Option<String>,
    #[sqlx(rename = "ImageScheme")]
    #[serde(rename = "ImageScheme")]
    pub image_scheme: Option<String>,
}

/// Values for a new image.
pub type NewImage = ImageRow;

/// Replacement values for an existing image.
///
/// Ownership is deliberately absent: an image cannot move between samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpdate {
    #[serde(rename = "ImageNO")]
    pub image_no: i64,
    #[serde(rename = "ImageCode")]
    pub image_code: Option<String>,
    #[serde(rename = "OriginalFilename")]
    pub original_filename: Option<String>,
    #[serde(rename = "ImageScheme")]
    pub image_scheme: Option<String>,
}

/// An image together with its owning sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    #[serde(flatten)]
    pub image: ImageRow,
    #[serde(rename = "Sample")]
    pub sample: SampleRow,
}

/// A deleted image together with its owning sample as left by the delete.
#[derive(Debug, Clone)]
pub struct DeletedImage {
    pub image: ImageRow,
    pub sample: SampleRow,
}

/// Flat row of the image/sample join.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ImageEntryRow {
    #[sqlx(rename = "ImageID")]
    pub image_id: String,
    #[sqlx(rename = "SampleID")]
    pub sample_id: i64,
    #[sqlx(rename = "ImageNO")]
    pub image_no: i64,
    #[sqlx(rename = "ImageCode")]
    pub image_code: Option<String>,
    #[sqlx(rename = "OriginalFilename")]
    pub original_filename: Option<String>,
    #[sqlx(rename = "ImageScheme")]
    pub image_scheme: Option<String>,
    #[sqlx(rename = "DatasetID")]
    pub dataset_id: String,
    #[sqlx(rename = "SampleType")]
    pub sample_type: String,
    #[sqlx(rename = "Metadata")]
    pub metadata: Option<String>,
    #[sqlx(rename = "ImageCount")]
    pub image_count: i64,
}

impl From<ImageEntryRow> for ImageEntry {
    fn from(row: ImageEntryRow) -> Self {
        Self {
            image: ImageRow {
                image_id: row.image_id,
                sample_id: row.sample_id,
                image_no: row.image_no,
                image_code: row.image_code,
                original_filename: row.original_filename,
                image_scheme: row.image_scheme,
            },
            sample: SampleRow {
                sample_id: row.sample_id,
                dataset_id: row.dataset_id,
                sample_type: row.sample_type,
                metadata: row.metadata,
                image_count: row.image_count,
            },
        }
    }
}

/// Image query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFilter {
    /// Every image in the dataset, in insertion order.
    All,
    /// Images owned by one sample, in insertion order.
    BySample(i64),
    /// A single image by identifier.
    ById(String),
}

// =============================================================================
// Migrations
// =============================================================================

/// Applied migration record.
#[derive(Debug, Clone, FromRow)]
pub struct MigrationRow {
    pub version: i64,
    pub name: String,
    pub applied_at: OffsetDateTime,
}
