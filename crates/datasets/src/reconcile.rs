//! Consistency check between image rows and stored blobs.
//!
//! Inserts write the blob before the row and deletes remove the row before
//! the blob, so a crash or failure between the two steps can leave a blob no
//! row refers to. Rows without blobs are legal (metadata-only images).

use crate::error::DatasetResult;
use crate::store::{DatasetStore, ReconcileOptions, ReconcileReport};
use ldm_core::canonical_identifier;
use ldm_metadata::models::ImageFilter;
use ldm_metadata::repos::ImageRepo;
use ldm_storage::{BlobStore, Removal};
use std::collections::BTreeSet;

pub(crate) async fn run(
    store: &DatasetStore,
    options: ReconcileOptions,
) -> DatasetResult<ReconcileReport> {
    let rows: BTreeSet<String> = store
        .metadata()
        .list_images(&ImageFilter::All)
        .await?
        .into_iter()
        .map(|entry| entry.image.image_id)
        .collect();
    let blobs: BTreeSet<String> = store.blobs().list().await?.into_iter().collect();

    let mut report = ReconcileReport {
        orphan_blobs: blobs.difference(&rows).cloned().collect(),
        missing_blobs: rows.difference(&blobs).cloned().collect(),
        removed_orphans: Vec::new(),
    };

    for key in &report.orphan_blobs {
        tracing::warn!(key = %key, "Blob has no image row");
    }

    if options.remove_orphans {
        for key in &report.orphan_blobs {
            // Keys are re-resolved on delete, so a file name that is not its
            // own canonical form (e.g. a literal `x%2Fy`) would address a
            // different blob.
            if canonical_identifier(key).ok().as_deref() != Some(key.as_str()) {
                tracing::warn!(key = %key, "Orphan blob name is not canonical; leaving it in place");
                continue;
            }
            // A row may have been committed for this key since the listing.
            if store.metadata().get_image(key).await?.is_some() {
                continue;
            }
            if store.blobs().delete(key).await? == Removal::Removed {
                report.removed_orphans.push(key.clone());
            }
        }
        tracing::info!(removed = report.removed_orphans.len(), "Removed orphan blobs");
    }

    Ok(report)
}
