//! Configuration for the stock ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// HTTP listen address (gateway)
    pub http_listen_addr: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Consistency guard configuration
    pub guard: GuardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/stockledger"),
            service_name: "stockledger-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            http_listen_addr: "0.0.0.0:8080".to_string(),
            rocksdb: RocksDbConfig::default(),
            guard: GuardConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Consistency guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Bound on waiting for per-product exclusivity (milliseconds)
    pub lock_timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("STOCKLEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("STOCKLEDGER_HTTP_ADDR") {
            config.http_listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("STOCKLEDGER_LOCK_TIMEOUT_MS") {
            config.guard.lock_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid lock timeout: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "stockledger-core");
        assert_eq!(config.http_listen_addr, "0.0.0.0:8080");
        assert_eq!(config.guard.lock_timeout_ms, 2_000);
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.guard.lock_timeout_ms, config.guard.lock_timeout_ms);
    }
}
