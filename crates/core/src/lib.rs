//! Core domain types and shared logic for the local dataset manager.
//!
//! This crate defines what every other crate agrees on:
//! - Dataset identifiers and their validation
//! - Image identifier canonicalization and path resolution
//! - Application configuration

pub mod config;
pub mod error;
pub mod identifier;

pub use error::{Error, Result};
pub use identifier::{DatasetId, canonical_identifier, resolve};

/// File name of the relational store inside a dataset directory.
pub const DATABASE_FILE_NAME: &str = "ldm.db";

/// Name of the image directory inside a dataset directory.
pub const IMAGES_DIR_NAME: &str = "images";
