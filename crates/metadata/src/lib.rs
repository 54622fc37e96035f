//! Per-dataset relational store for the local dataset manager.
//!
//! Each dataset owns one SQLite database (`ldm.db`) holding:
//! - `Sample` rows with their image count and metadata snapshot
//! - `Image` rows, each owned by exactly one sample
//! - A versioned migration history
//!
//! Image-count maintenance and snapshot recomputation happen inside the same
//! transaction as the image change, so no reader ever sees them stale.

pub mod error;
pub mod migrations;
pub mod models;
pub mod repos;
pub mod snapshot;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use migrations::TARGET_VERSION;
pub use store::{MetadataStore, SqliteStore};
