//! Datasets for the local dataset manager.
//!
//! A [`Registry`] owns a storage root and provisions one directory per
//! dataset. A [`DatasetStore`] is a handle on one dataset that keeps its
//! relational rows and image blobs consistent:
//! - inserts write the blob first, then commit the row
//! - deletes commit the row removal first, then remove the blob
//! - sample image counts and snapshots change in the same transaction as
//!   the images they describe

pub mod error;
mod reconcile;
pub mod registry;
pub mod store;

pub use error::{DatasetError, DatasetResult, ErrorKind};
pub use registry::Registry;
pub use store::{
    BlobWarning, DatasetStore, ImageDeletion, ReconcileOptions, ReconcileReport, SampleDeletion,
};

pub use ldm_metadata::models::{
    ImageEntry, ImageFilter, ImageRow, ImageUpdate, NewImage, SampleRow,
};
pub use ldm_storage::{ByteStream, once_stream};
