//! Common test utilities and fixtures.

pub mod fixtures;

use ldm_datasets::Registry;
use tempfile::TempDir;

/// A registry over a temporary storage root that cleans up on drop.
#[allow(dead_code)]
pub struct TestRegistry {
    pub registry: Registry,
    pub temp_dir: TempDir,
}

impl TestRegistry {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let registry = Registry::new(temp_dir.path());
        Self { registry, temp_dir }
    }
}
