//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use time::OffsetDateTime;

/// A boxed stream of bytes, used for both streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Outcome of a successful delete.
///
/// A blob that was already absent is not an error: callers that only need
/// the blob gone can treat both variants alike, while callers that care can
/// tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The blob existed and was removed.
    Removed,
    /// There was no blob under the key.
    Absent,
}

impl Removal {
    /// Whether a blob existed before the delete.
    pub fn existed(self) -> bool {
        matches!(self, Self::Removed)
    }
}

/// Blob metadata.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<OffsetDateTime>,
}

/// Image blob store.
///
/// Keys are raw image identifiers; backends resolve them with
/// [`ldm_core::resolve`] and reject anything that does not stay below their
/// root with [`StorageError::InvalidKey`](crate::StorageError::InvalidKey).
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get blob metadata.
    async fn head(&self, key: &str) -> StorageResult<BlobMeta>;

    /// Read a whole blob.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Read a blob as a stream of chunks.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Write a blob, replacing any existing one. Returns the bytes written.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64>;

    /// Start a streaming write. Nothing is visible under `key` until
    /// [`StreamingUpload::finish`] succeeds.
    async fn begin_upload(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Remove a blob.
    async fn delete(&self, key: &str) -> StorageResult<Removal>;

    /// List the keys of all stored blobs, in canonical form.
    async fn list(&self) -> StorageResult<Vec<String>>;

    /// Get the backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Check backend health.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Write a stream to a blob, replacing any existing one.
    ///
    /// If the stream yields an error the partial upload is aborted and the
    /// error is returned; the previous blob, if any, is left untouched.
    async fn save(&self, key: &str, mut data: ByteStream) -> StorageResult<u64> {
        let mut upload = self.begin_upload(key).await?;
        while let Some(chunk) = data.next().await {
            let written = match chunk {
                Ok(bytes) => upload.write(bytes).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                upload.abort().await?;
                return Err(e);
            }
        }
        upload.finish().await
    }
}

/// Streaming upload handle.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and publish the blob. Returns total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload and discard partial data.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Wrap in-memory bytes as a single-chunk [`ByteStream`].
pub fn once_stream(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}
