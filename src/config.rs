//! Configuration parsing for the Stockroom daemon.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::cache::CacheConfig;
use crate::storage::debounce::DebounceConfig;
use crate::storage::file::FileStoreConfig;

/// Stockroom: embedded collection store with debounced JSON files and SQLite backing.
#[derive(Parser, Debug, Clone)]
#[command(name = "stockroom")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Directory holding collection files, backups and the SQLite database
    #[arg(short, long, env = "STOCKROOM_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Store high-traffic collections in SQLite
    #[arg(long, env = "STOCKROOM_SQLITE", default_value_t = true, action = clap::ArgAction::Set)]
    pub sqlite: bool,

    /// SQLite database file name inside the data directory
    #[arg(long, env = "STOCKROOM_SQLITE_FILE", default_value = "stockroom.sqlite3")]
    pub sqlite_file: String,

    /// Size of the SQLite reader connection pool
    #[arg(long, env = "STOCKROOM_READER_POOL_SIZE", default_value_t = 4)]
    pub reader_pool_size: u32,

    /// Seconds a file-backed collection is served from memory before reloading
    #[arg(long, env = "STOCKROOM_CACHE_TTL_SECS", default_value_t = 60)]
    pub cache_ttl_secs: u64,

    /// Milliseconds to coalesce writes before touching disk
    #[arg(long, env = "STOCKROOM_DEBOUNCE_MS", default_value_t = 50)]
    pub debounce_ms: u64,

    /// Milliseconds a full SQLite table read stays cached
    #[arg(long, env = "STOCKROOM_SQLITE_CACHE_TTL_MS", default_value_t = 2000)]
    pub sqlite_cache_ttl_ms: u64,

    /// Records kept in each SQLite collection's LRU cache
    #[arg(long, env = "STOCKROOM_RECORD_CACHE_SIZE", default_value_t = 1024)]
    pub record_cache_size: usize,

    /// Backups kept per collection
    #[arg(long, env = "STOCKROOM_BACKUP_KEEP", default_value_t = 5)]
    pub backup_keep: usize,

    /// Seconds between scheduled backups (0 disables them)
    #[arg(long, env = "STOCKROOM_BACKUP_INTERVAL_SECS", default_value_t = 0)]
    pub backup_interval_secs: u64,

    /// Emit logs as JSON
    #[arg(long, env = "STOCKROOM_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Settings for file-backed stores.
    pub fn file_store_config(&self) -> FileStoreConfig {
        FileStoreConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            debounce: DebounceConfig::from_config(self.debounce_ms),
            backup_keep: self.backup_keep,
        }
    }

    /// Settings for SQLite read caches.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from_config(self.record_cache_size, self.sqlite_cache_ttl_ms)
    }

    /// Scheduled backup period, if enabled.
    pub fn backup_interval(&self) -> Option<Duration> {
        (self.backup_interval_secs > 0).then(|| Duration::from_secs(self.backup_interval_secs))
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            debounce_ms: 5,
            reader_pool_size: 2,
            log_level: "debug".into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            sqlite: true,
            sqlite_file: "stockroom.sqlite3".into(),
            reader_pool_size: 4,
            cache_ttl_secs: 60,
            debounce_ms: 50,
            sqlite_cache_ttl_ms: 2000,
            record_cache_size: 1024,
            backup_keep: 5,
            backup_interval_secs: 0,
            log_json: false,
            log_level: "info".into(),
            otel_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sqlite);
        assert_eq!(config.file_store_config().cache_ttl, Duration::from_secs(60));
        assert_eq!(
            config.file_store_config().debounce.delay,
            Duration::from_millis(50)
        );
        assert_eq!(config.backup_interval(), None);
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::parse_from([
            "stockroom",
            "--data-dir",
            "/srv/shop",
            "--sqlite",
            "false",
            "--backup-interval-secs",
            "3600",
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/srv/shop"));
        assert!(!config.sqlite);
        assert_eq!(config.backup_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(config.cache_config().snapshot_ttl, Duration::from_secs(2));
    }
}
