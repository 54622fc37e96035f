//! Sample metadata snapshots.
//!
//! A sample's `Metadata` column holds a JSON snapshot of the sample's own
//! scalar fields. The snapshot is built from an explicit field list rather
//! than by serializing the row, so the image collection, binary payloads and
//! the `Metadata` column itself can never leak into it.

use crate::error::MetadataResult;
use crate::models::SampleRow;
use serde::{Deserialize, Serialize};

/// The fields a sample snapshot carries, and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleSnapshot {
    #[serde(rename = "SampleID")]
    pub sample_id: i64,
    #[serde(rename = "DatasetID")]
    pub dataset_id: String,
    #[serde(rename = "SampleType")]
    pub sample_type: String,
    #[serde(rename = "ImageCount")]
    pub image_count: i64,
}

impl From<&SampleRow> for SampleSnapshot {
    fn from(sample: &SampleRow) -> Self {
        Self {
            sample_id: sample.sample_id,
            dataset_id: sample.dataset_id.clone(),
            sample_type: sample.sample_type.clone(),
            image_count: sample.image_count,
        }
    }
}

/// Serialize the snapshot of `sample` as it stands now.
///
/// Callers must set `image_count` before calling this.
pub fn recompute(sample: &SampleRow) -> MetadataResult<String> {
    Ok(serde_json::to_string(&SampleSnapshot::from(sample))?)
}

/// Parse a stored snapshot.
pub fn decode(metadata: &str) -> MetadataResult<SampleSnapshot> {
    Ok(serde_json::from_str(metadata)?)
}
