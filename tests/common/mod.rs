//! Test utilities for Stockroom integration tests.
//!
//! Provides:
//! - Temporary data directory fixtures
//! - Store and registry constructors over that directory
//! - Async polling helper

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use stockroom::catalog::CollectionSpec;
use stockroom::clock;
use stockroom::storage::cache::CacheConfig;
use stockroom::storage::debounce::DebounceConfig;
use stockroom::storage::file::FileStoreConfig;
use stockroom::storage::{FileStore, SqliteEngine, SqliteStore};
use stockroom::{RegistryBuilder, StoreRegistry};
use tempfile::TempDir;

/// Test fixture that manages a temporary data directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary data directory
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty data directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self { temp_dir }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of a collection file in the data directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.data_dir().join(format!("{name}.json"))
    }

    /// Open a file store with a short debounce window.
    pub fn file_store(&self, spec: &CollectionSpec) -> FileStore {
        FileStore::open(spec, self.data_dir(), file_config(), clock::system())
    }

    /// Open a SQLite store on a fresh engine in the data directory.
    pub fn sqlite_store(&self, spec: &CollectionSpec) -> SqliteStore {
        let engine = SqliteEngine::open(&self.data_dir().join("test.sqlite3"), 2)
            .expect("failed to open sqlite engine");
        SqliteStore::open(
            Arc::new(engine),
            spec,
            self.data_dir(),
            CacheConfig::default(),
            clock::system(),
        )
        .expect("failed to open sqlite store")
    }

    /// Build the storefront registry over the data directory.
    pub fn registry(&self, sqlite: bool) -> StoreRegistry {
        RegistryBuilder::new(self.data_dir())
            .with_sqlite(sqlite)
            .with_file_config(file_config())
            .build()
            .expect("failed to build registry")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn file_config() -> FileStoreConfig {
    FileStoreConfig {
        debounce: DebounceConfig {
            delay: Duration::from_millis(20),
        },
        ..FileStoreConfig::default()
    }
}

/// Read a collection file as JSON.
pub fn read_json(path: &Path) -> serde_json::Value {
    let bytes = std::fs::read(path).expect("failed to read collection file");
    serde_json::from_slice(&bytes).expect("collection file is not valid JSON")
}

/// Wait for a condition to become true with timeout.
///
/// # Arguments
///
/// * `timeout` - Maximum time to wait
/// * `condition` - Closure that returns true when condition is met
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
