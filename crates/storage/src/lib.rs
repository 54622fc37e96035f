//! Image blob storage for the local dataset manager.
//!
//! This crate provides:
//! - The [`BlobStore`] trait used by dataset handles
//! - Atomic writes (temp file, fsync, rename) so readers never see a torn blob
//! - A local filesystem backend rooted at a dataset's image directory
//!
//! Every key is resolved through [`ldm_core::resolve`]; no backend builds a
//! blob path any other way.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{BlobMeta, BlobStore, ByteStream, Removal, StreamingUpload, once_stream};
