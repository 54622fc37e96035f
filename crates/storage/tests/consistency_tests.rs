// Consistency tests for concurrent writers to the same blob key.
// Every reader must observe one complete payload, never a mix or a prefix.

mod common;

use bytes::Bytes;
use common::fixtures::seeded_bytes;
use ldm_storage::{BlobStore, FilesystemBackend, Removal};
use std::sync::Arc;
use tempfile::TempDir;

const PAYLOAD_LEN: usize = 256 * 1024;

#[tokio::test]
async fn test_concurrent_writers_never_tear_a_blob() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(FilesystemBackend::new(temp_dir.path()).await.unwrap());

    let payloads: Vec<Bytes> = (0..8).map(|seed| seeded_bytes(seed, PAYLOAD_LEN)).collect();

    let mut handles = Vec::new();
    for payload in payloads.clone() {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..4 {
                backend.put("shared", payload.clone()).await.unwrap();
            }
        }));
    }

    let reader = {
        let backend = backend.clone();
        let payloads = payloads.clone();
        tokio::spawn(async move {
            for _ in 0..32 {
                if let Ok(data) = backend.get("shared").await {
                    assert!(
                        payloads.contains(&data),
                        "reader observed a torn blob of {} bytes",
                        data.len()
                    );
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for handle in handles {
        handle.await.unwrap();
    }
    reader.await.unwrap();

    // Last writer wins: the final blob is one of the payloads, complete.
    let last = backend.get("shared").await.unwrap();
    assert!(payloads.contains(&last));
    assert_eq!(backend.list().await.unwrap(), vec!["shared".to_string()]);
}

#[tokio::test]
async fn test_concurrent_deletes_report_exactly_one_removal() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(FilesystemBackend::new(temp_dir.path()).await.unwrap());
    backend
        .put("victim", seeded_bytes(1, 1024))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move { backend.delete("victim").await.unwrap() }));
    }

    let mut removed = 0;
    for handle in handles {
        if handle.await.unwrap() == Removal::Removed {
            removed += 1;
        }
    }
    assert_eq!(removed, 1);
    assert!(!backend.exists("victim").await.unwrap());
}
