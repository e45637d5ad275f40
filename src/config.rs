use crate::error::{BatchOperationError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default configuration file, looked up relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/batchop.toml";

/// Prefix of environment variables overriding file values,
/// e.g. `BATCHOP__SCHEDULER_INTERVAL_MS=250`
pub const ENV_PREFIX: &str = "BATCHOP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOperationConfig {
    /// Interval between two scheduler scans
    pub scheduler_interval_ms: u64,
    /// Upper bound of items persisted in one chunk
    pub max_chunk_items: usize,
    /// Upper bound of the serialized size of one chunk
    pub max_chunk_bytes: usize,
    /// Partitions of the in-process cluster
    pub partition_count: u32,
    /// How long a distribution may stay unacknowledged before it is sent again
    pub distribution_retry_interval_ms: u64,
}

impl Default for BatchOperationConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: 100,
            max_chunk_items: 3_500,
            max_chunk_bytes: 1024 * 1024,
            partition_count: 3,
            distribution_retry_interval_ms: 1_000,
        }
    }
}

impl BatchOperationConfig {
    /// Load from [`DEFAULT_CONFIG_FILE`] (if present) and `BATCHOP__*` variables
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit file (if given) and `BATCHOP__*` variables
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: Self = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(
            scheduler_interval_ms = config.scheduler_interval_ms,
            max_chunk_items = config.max_chunk_items,
            max_chunk_bytes = config.max_chunk_bytes,
            partition_count = config.partition_count,
            "Batch operation configuration loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler_interval_ms == 0 {
            return Err(BatchOperationError::ConfigurationError(
                "scheduler_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_chunk_items == 0 {
            return Err(BatchOperationError::ConfigurationError(
                "max_chunk_items must be greater than 0".to_string(),
            ));
        }
        if self.max_chunk_bytes == 0 {
            return Err(BatchOperationError::ConfigurationError(
                "max_chunk_bytes must be greater than 0".to_string(),
            ));
        }
        if self.partition_count == 0 {
            return Err(BatchOperationError::ConfigurationError(
                "partition_count must be greater than 0".to_string(),
            ));
        }
        if self.distribution_retry_interval_ms == 0 {
            return Err(BatchOperationError::ConfigurationError(
                "distribution_retry_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    pub fn distribution_retry_interval(&self) -> Duration {
        Duration::from_millis(self.distribution_retry_interval_ms)
    }
}
