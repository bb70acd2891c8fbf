//! Service configuration.
//!
//! Settings for scanning, fetching, partitioning and index persistence.
//! Configuration can be loaded from and saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::partition::{ParallelPartitioner, PartitionConfig};

/// Configuration file name.
pub const CONFIG_FILE: &str = "craftscan.toml";

/// Largest accepted search radius.
pub const MAX_SEARCH_RADIUS: i32 = 64;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be written
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Craftability service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Master switch; a disabled service ignores scan requests
    pub enabled: bool,
    /// Allow fetch requests
    pub fetch_enabled: bool,
    /// Storage search radius in blocks
    pub search_radius: i32,
    /// Catalog scan workers: -1 or 0 automatic, 1 sequential, n fixed
    pub partitions: i32,
    /// Run the full-catalog pass after recipe deduction
    pub full_catalog_scan: bool,
    /// Window in which repeated scan requests coalesce
    pub debounce_ms: u64,
    /// Interval at which queued scans are rechecked
    pub queue_recheck_ms: u64,
    /// How long callers wait for a recipe index
    pub index_wait_timeout_ms: u64,
    /// Directory for persisted recipe indexes, none to disable
    pub cache_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fetch_enabled: true,
            search_radius: 20,
            partitions: -1,
            full_catalog_scan: true,
            debounce_ms: 400,
            queue_recheck_ms: 300,
            index_wait_timeout_ms: 15_000,
            cache_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str::<Self>(&contents) {
                    Ok(mut config) => {
                        config.validate();
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values into their accepted ranges.
    pub fn validate(&mut self) {
        self.search_radius = self.search_radius.clamp(0, MAX_SEARCH_RADIUS);
        self.partitions = self.partitions.max(-1);
        self.index_wait_timeout_ms = self.index_wait_timeout_ms.max(1);
    }

    /// Partitioner honoring the `partitions` override.
    #[must_use]
    pub fn partitioner(&self) -> ParallelPartitioner {
        ParallelPartitioner::new(PartitionConfig::default()).with_override(self.partitions)
    }

    /// Debounce window.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Queue recheck interval.
    #[must_use]
    pub const fn queue_recheck(&self) -> Duration {
        Duration::from_millis(self.queue_recheck_ms)
    }

    /// Index wait timeout.
    #[must_use]
    pub const fn index_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.index_wait_timeout_ms)
    }
}
