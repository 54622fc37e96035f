//! Configuration types shared across crates.

use crate::{Error, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variables that override configuration values.
/// Nested keys are separated by `__`, e.g. `LDM_STORAGE__ROOT=/srv/datasets`.
pub const ENV_PREFIX: &str = "LDM_";

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Dataset storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-dataset relational store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Dataset storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per dataset.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

/// SQLite journal mode for dataset databases.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead log (recommended: readers do not block the writer).
    #[default]
    Wal,
    /// Rollback journal, deleted after each transaction.
    Delete,
}

/// Per-dataset relational store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    /// Journal mode applied when a dataset database is opened.
    #[serde(default)]
    pub journal_mode: JournalMode,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./database")
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            busy_timeout_secs: default_busy_timeout_secs(),
            journal_mode: JournalMode::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional TOML file, and
    /// `LDM_`-prefixed environment variables, in increasing precedence.
    ///
    /// A missing file is not an error; the remaining layers still apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path
            && path.exists()
        {
            figment = figment.merge(Toml::file(path));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(Error::Config("storage.root cannot be empty".to_string()));
        }
        if self.metadata.busy_timeout_secs == 0 {
            return Err(Error::Config(
                "metadata.busy_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration rooted at `root`.
    ///
    /// **For testing only.**
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig { root: root.into() },
            metadata: MetadataConfig::default(),
        }
    }
}
