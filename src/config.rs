//! Process-level configuration (SPEC_FULL.md ambient stack section).
//!
//! Tunables are deserialized from TOML the same way wave manifests are
//! (`wave::manifest`): unknown fields are ignored with a `tracing::warn!`
//! rather than a hard error, so older config files keep working against a
//! newer binary.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

fn default_cache_capacity() -> usize {
    2_000
}

fn default_cache_ttl_secs() -> u64 {
    6 * 60 * 60
}

fn default_max_parallelism() -> usize {
    4
}

fn default_total_timeout_ms() -> u64 {
    10_000
}

fn default_flush_interval_ms() -> u64 {
    500
}

fn default_cache_confidence_threshold() -> f64 {
    0.6
}

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub manifest_dir: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Minimum merged confidence a completed analysis must reach before it's
    /// written into the fast-path cache (spec.md §3 `CachedSignature`
    /// lifecycle).
    #[serde(default = "default_cache_confidence_threshold")]
    pub cache_confidence_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_dir: None,
            store_path: None,
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_parallelism: default_max_parallelism(),
            total_timeout_ms: default_total_timeout_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            cache_confidence_threshold: default_cache_confidence_threshold(),
        }
    }
}

impl Config {
    /// Parses a TOML document, warning (not failing) on unknown top-level
    /// keys left by an older config format.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Platform default durable-store path, `directories`-resolved the way
    /// the teacher resolves its default storage location.
    pub fn default_store_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "imagewave", "imagewave")
            .map(|dirs| dirs.data_dir().join("signatures.sqlite3"))
    }

    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path.clone().or_else(Self::default_store_path)
    }
}
