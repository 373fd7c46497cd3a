//! Configuration for cube evaluation.

use serde::{Deserialize, Serialize};

/// Runtime configuration shared by cube nodes and query engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeConfig {
    /// Worker threads used by the query engines.
    pub threads: usize,

    /// Memory budget for each node's chunk cache in megabytes.
    pub chunk_cache_size_mb: usize,

    /// Report progress while queries run.
    pub progress: bool,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            chunk_cache_size_mb: 256,
            progress: false,
        }
    }
}

impl CubeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CUBE_THREADS") {
            if let Ok(threads) = val.parse() {
                config.threads = threads;
            }
        }

        if let Ok(val) = std::env::var("CHUNK_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.chunk_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("CUBE_PROGRESS") {
            config.progress = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("threads must be > 0".to_string());
        }

        if self.chunk_cache_size_mb == 0 {
            return Err("chunk_cache_size_mb must be > 0".to_string());
        }

        Ok(())
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CubeConfig::default();
        assert!(config.threads >= 1);
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_cache_size_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = CubeConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CubeConfig {
            chunk_cache_size_mb: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
