//! Storage engines for Stockroom.
//!
//! Provides:
//! - Atomic JSON file writes and timestamped backups
//! - Single-flight debounced write queue
//! - Derived secondary indexes and record/snapshot caches
//! - File-backed collection store
//! - SQLite schema, reader pool and SQLite-backed collection store

pub mod atomic;
pub mod cache;
pub mod debounce;
pub mod file;
pub mod index;
pub mod reader;
pub mod schema;
pub mod sqlite;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::query::Query;
use crate::record::{CollectionData, Record, Shape};

pub use file::FileStore;
pub use sqlite::{SqliteEngine, SqliteStore};

/// Lock a mutex, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which engine a collection lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    File,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Uniform contract over one named collection.
///
/// Absence is never an error: lookups return `None`, deletes return `false`.
/// List-only operations on a map collection (and the reverse) fail with
/// [`StoreError::WrongShape`](crate::StoreError::WrongShape).
pub trait CollectionStore: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn shape(&self) -> Shape;
    fn backend(&self) -> Backend;

    /// Full contents.
    fn find_all(&self) -> Result<Arc<CollectionData>>;
    fn find_by_id(&self, id: &str) -> Result<Option<Record>>;
    /// First record matching every predicate.
    fn find_one(&self, query: &Query) -> Result<Option<Record>>;
    fn find(&self, query: &Query) -> Result<Vec<Record>>;

    /// Append a record, assigning an id if it has none.
    fn create(&self, record: Record) -> Result<Record>;
    /// Shallow-merge `patch` into the record with `id`.
    fn update(&self, id: &str, patch: Record) -> Result<Option<Record>>;
    /// Remove a record (or a key, for maps).
    fn delete(&self, id: &str) -> Result<bool>;
    fn insert_many(&self, records: Vec<Record>) -> Result<Vec<Record>>;
    fn delete_many(&self, query: &Query) -> Result<usize>;
    fn replace_all(&self, data: CollectionData) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn count(&self) -> Result<usize>;

    /// Snapshot the collection into a timestamped backup directory.
    ///
    /// Engines without file snapshots return `Ok(None)`.
    fn backup(&self) -> Result<Option<PathBuf>>;

    /// Make every accepted write durable before returning.
    fn flush(&self) -> Result<()>;

    /// The backing data changed outside this store.
    fn invalidate(&self);
}
