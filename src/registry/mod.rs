//! Store registry.
//!
//! Maps every catalog collection to one store instance, chosen once when
//! the registry is built. [`RegistryBuilder`] is the unconfigured state and
//! [`StoreRegistry`] the ready one; the application builds it at startup and
//! passes it to whatever needs a collection.

mod maintenance;

pub use maintenance::{BackupReport, CollectionStats, RepairReport};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::catalog::{Catalog, CollectionSpec};
use crate::clock::{self, SharedClock};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::storage::cache::CacheConfig;
use crate::storage::file::FileStoreConfig;
use crate::storage::sqlite::DEFAULT_READERS;
use crate::storage::{Backend, CollectionStore, FileStore, SqliteEngine, SqliteStore};

/// Default SQLite file name inside the data directory.
pub const DEFAULT_SQLITE_FILE: &str = "stockroom.sqlite3";

/// Registry configuration, before any store is opened.
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    data_dir: PathBuf,
    catalog: Catalog,
    clock: SharedClock,
    file: FileStoreConfig,
    cache: CacheConfig,
    sqlite: bool,
    sqlite_file: String,
    readers: u32,
}

impl RegistryBuilder {
    /// Storefront catalog with default settings.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            catalog: Catalog::storefront(),
            clock: clock::system(),
            file: FileStoreConfig::default(),
            cache: CacheConfig::default(),
            sqlite: true,
            sqlite_file: DEFAULT_SQLITE_FILE.to_string(),
            readers: DEFAULT_READERS,
        }
    }

    /// Builder seeded from application config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.data_dir)
            .with_sqlite(config.sqlite)
            .with_sqlite_file(&config.sqlite_file)
            .with_file_config(config.file_store_config())
            .with_cache_config(config.cache_config())
            .with_readers(config.reader_pool_size)
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_file_config(mut self, file: FileStoreConfig) -> Self {
        self.file = file;
        self
    }

    #[must_use]
    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Allow SQLite for collections that prefer it.
    #[must_use]
    pub fn with_sqlite(mut self, enabled: bool) -> Self {
        self.sqlite = enabled;
        self
    }

    /// Size of the SQLite reader pool.
    #[must_use]
    pub fn with_readers(mut self, readers: u32) -> Self {
        self.readers = readers;
        self
    }

    #[must_use]
    pub fn with_sqlite_file(mut self, file: impl Into<String>) -> Self {
        self.sqlite_file = file.into();
        self
    }

    /// Open every collection.
    ///
    /// The SQLite engine is tried once. If it cannot be opened every
    /// collection is file-backed.
    pub fn build(self) -> Result<StoreRegistry> {
        fs::create_dir_all(&self.data_dir)?;

        let wants_sqlite = self.sqlite && self.catalog.iter().any(|s| s.prefers_sqlite);
        let engine = if wants_sqlite {
            let path = self.data_dir.join(&self.sqlite_file);
            match SqliteEngine::open(&path, self.readers) {
                Ok(engine) => Some(Arc::new(engine)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "SQLite unavailable, all collections are file-backed");
                    None
                }
            }
        } else {
            None
        };

        let mut stores: HashMap<String, Arc<dyn CollectionStore>> = HashMap::new();
        for spec in self.catalog.iter() {
            let store = self.open_store(spec, engine.as_ref());
            info!(collection = %spec.name, backend = %store.backend(), shape = %spec.shape, "Collection ready");
            stores.insert(spec.name.clone(), store);
        }

        Ok(StoreRegistry {
            data_dir: self.data_dir,
            catalog: self.catalog,
            stores,
            engine,
            backup_keep: self.file.backup_keep,
        })
    }

    fn open_store(
        &self,
        spec: &CollectionSpec,
        engine: Option<&Arc<SqliteEngine>>,
    ) -> Arc<dyn CollectionStore> {
        if let Some(engine) = engine.filter(|_| spec.prefers_sqlite) {
            match SqliteStore::open(
                Arc::clone(engine),
                spec,
                &self.data_dir,
                self.cache,
                Arc::clone(&self.clock),
            ) {
                Ok(store) => return Arc::new(store),
                Err(e) => {
                    error!(collection = %spec.name, error = %e, "Failed to open SQLite table, using JSON file");
                }
            }
        }
        Arc::new(FileStore::open(
            spec,
            &self.data_dir,
            self.file,
            Arc::clone(&self.clock),
        ))
    }
}

/// Ready registry: one store per catalog collection.
#[derive(Debug)]
pub struct StoreRegistry {
    data_dir: PathBuf,
    catalog: Catalog,
    stores: HashMap<String, Arc<dyn CollectionStore>>,
    engine: Option<Arc<SqliteEngine>>,
    backup_keep: usize,
}

impl StoreRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<dyn CollectionStore>> {
        self.stores.get(name).cloned()
    }

    /// Like [`get`](Self::get), but unknown names are an error.
    pub fn collection(&self, name: &str) -> Result<Arc<dyn CollectionStore>> {
        self.get(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    /// Collection names in catalog order.
    pub fn names(&self) -> Vec<&str> {
        self.catalog.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn backend_of(&self, name: &str) -> Option<Backend> {
        self.stores.get(name).map(|s| s.backend())
    }

    pub fn sqlite_enabled(&self) -> bool {
        self.engine.is_some()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Flush every store. Called on graceful shutdown.
    ///
    /// All stores are attempted; the first error is returned.
    pub fn flush_all(&self) -> Result<()> {
        let mut first_error = None;
        for name in self.names() {
            let Some(store) = self.stores.get(name) else {
                continue;
            };
            if let Err(e) = store.flush() {
                error!(collection = %name, error = %e, "Failed to flush collection");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tell a store its backing data changed out of band.
    pub fn invalidate(&self, name: &str) -> Result<()> {
        self.collection(name)?.invalidate();
        Ok(())
    }

    fn stores_in_order(&self) -> impl Iterator<Item = (&CollectionSpec, &Arc<dyn CollectionStore>)> {
        self.catalog
            .iter()
            .filter_map(|spec| self.stores.get(&spec.name).map(|store| (spec, store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Shape;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_preferred_collections_use_sqlite() {
        let dir = TempDir::new().unwrap();
        let registry = RegistryBuilder::new(dir.path()).build().unwrap();

        assert!(registry.sqlite_enabled());
        for name in ["users", "sessions", "contacts", "orders"] {
            assert_eq!(registry.backend_of(name), Some(Backend::Sqlite), "{name}");
        }
        assert_eq!(registry.backend_of("products"), Some(Backend::File));
        assert_eq!(registry.backend_of("carts"), Some(Backend::File));
        assert_eq!(registry.names().len(), 13);
    }

    #[test]
    fn test_sqlite_disabled_means_all_files() {
        let dir = TempDir::new().unwrap();
        let registry = RegistryBuilder::new(dir.path())
            .with_sqlite(false)
            .build()
            .unwrap();

        assert!(!registry.sqlite_enabled());
        assert!(registry
            .names()
            .iter()
            .all(|n| registry.backend_of(n) == Some(Backend::File)));
    }

    #[test]
    fn test_unavailable_engine_falls_back_to_files() {
        let dir = TempDir::new().unwrap();
        // A directory where the database file should be.
        fs::create_dir_all(dir.path().join("blocked.sqlite3")).unwrap();

        let registry = RegistryBuilder::new(dir.path())
            .with_sqlite_file("blocked.sqlite3")
            .build()
            .unwrap();

        assert!(!registry.sqlite_enabled());
        assert_eq!(registry.backend_of("users"), Some(Backend::File));
    }

    #[test]
    fn test_unknown_collection() {
        let dir = TempDir::new().unwrap();
        let registry = RegistryBuilder::new(dir.path())
            .with_sqlite(false)
            .build()
            .unwrap();

        assert!(registry.get("nope").is_none());
        assert!(matches!(
            registry.collection("nope"),
            Err(StoreError::UnknownCollection(_))
        ));
        assert!(registry.invalidate("nope").is_err());
        assert_eq!(registry.collection("carts").unwrap().shape(), Shape::Map);
    }
}
