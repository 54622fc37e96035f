//! Integration tests for the SQLite metadata store.

mod common;

use common::{TestMetadata, new_image, new_sample};
use ldm_metadata::models::ImageFilter;
use ldm_metadata::repos::{ImageRepo, SampleRepo};
use ldm_metadata::snapshot;
use ldm_metadata::{MetadataError, MetadataStore, TARGET_VERSION};

#[tokio::test]
async fn test_rows_survive_reopen() {
    let metadata = TestMetadata::new().await.unwrap();
    metadata
        .store
        .create_sample(&new_sample(1, "cat"))
        .await
        .unwrap();
    metadata
        .store
        .insert_image(&new_image("a/b", 1))
        .await
        .unwrap();
    metadata.store.close().await;

    let reopened = metadata.reopen().await.unwrap();
    assert_eq!(reopened.schema_version().await.unwrap(), TARGET_VERSION);
    assert!(!reopened.is_stale().await.unwrap());

    let image = reopened.get_image("a/b").await.unwrap().unwrap();
    assert_eq!(image.sample_id, 1);
    assert_eq!(image.original_filename.as_deref(), Some("a/b.jpg"));
}

#[tokio::test]
async fn test_concurrent_handles_keep_count_consistent() {
    let metadata = TestMetadata::new().await.unwrap();
    metadata
        .store
        .create_sample(&new_sample(1, "cat"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = metadata.reopen().await.unwrap();
        handles.push(tokio::spawn(async move {
            for n in 0..10 {
                store
                    .insert_image(&new_image(&format!("w{worker}-{n}"), 1))
                    .await
                    .unwrap();
            }
            store.close().await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let sample = metadata.store.get_sample(1).await.unwrap().unwrap();
    assert_eq!(sample.image_count, 40);
    let images = metadata
        .store
        .list_images(&ImageFilter::BySample(1))
        .await
        .unwrap();
    assert_eq!(images.len(), 40);

    let snapshot = snapshot::decode(sample.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(snapshot.image_count, 40);
}

#[tokio::test]
async fn test_cascade_on_raw_delete() {
    let metadata = TestMetadata::new().await.unwrap();
    metadata
        .store
        .create_sample(&new_sample(1, "cat"))
        .await
        .unwrap();
    metadata
        .store
        .insert_image(&new_image("i1", 1))
        .await
        .unwrap();

    // The foreign key alone must remove owned images.
    sqlx::query("DELETE FROM \"Sample\" WHERE \"SampleID\" = 1")
        .execute(metadata.pool())
        .await
        .unwrap();

    assert!(metadata.store.get_image("i1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_divergent_history_is_rejected() {
    let metadata = TestMetadata::new().await.unwrap();
    sqlx::query("UPDATE \"__ldm_migrations\" SET name = 'renamed' WHERE version = 1")
        .execute(metadata.pool())
        .await
        .unwrap();

    assert!(matches!(
        metadata.store.migrate().await,
        Err(MetadataError::IncompatibleSchema(_))
    ));
}

#[tokio::test]
async fn test_missing_sample_lookups() {
    let metadata = TestMetadata::new().await.unwrap();

    assert!(metadata.store.get_sample(99).await.unwrap().is_none());
    assert!(metadata.store.list_samples().await.unwrap().is_empty());
    assert!(matches!(
        metadata.store.delete_image("nope").await,
        Err(MetadataError::NotFound(_))
    ));
}
