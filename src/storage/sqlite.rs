//! SQLite-backed collection store.
//!
//! All collections share one database file. Writes go through a single
//! writer connection and commit immediately; the engine's WAL provides
//! durability, so there is no application-level write buffer. Reads use the
//! reader pool and two caches that every write clears.
//!
//! On first open a collection whose table is empty is migrated from its JSON
//! file, so the two engines can be swapped without losing data.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::cache::{CacheConfig, RecordCache, SnapshotCache};
use super::reader::ReaderPool;
use super::schema::{self, apply_pragmas};
use super::{lock, Backend, CollectionStore};
use crate::catalog::CollectionSpec;
use crate::clock::SharedClock;
use crate::error::{Result, StoreError};
use crate::observability::metrics;
use crate::query::{Lookup, Query};
use crate::record::{CollectionData, Record, Shape};
use crate::now_millis;

/// Default number of pooled reader connections.
pub const DEFAULT_READERS: u32 = 4;

/// Shared database: one writer connection plus a reader pool.
#[derive(Debug)]
pub struct SqliteEngine {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: ReaderPool,
}

impl SqliteEngine {
    /// Open (or create) the database file.
    ///
    /// An error here means the engine is unavailable.
    pub fn open(path: &Path, readers: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(path)?;
        apply_pragmas(&writer)?;
        let readers = ReaderPool::new(path, readers)?;

        info!(path = %path.display(), "SQLite engine opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            readers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write<R>(&self, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        let mut conn = lock(&self.writer);
        f(&mut conn)
    }

    fn read<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self.readers.get()?;
        f(&conn)
    }

    /// Fold the WAL back into the main database without blocking readers.
    pub fn checkpoint(&self) -> Result<()> {
        self.write(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

/// SQL text for one collection table, built once.
#[derive(Debug)]
struct Statements {
    select_all: String,
    select_by_id: String,
    select_where: String,
    count: String,
    insert: String,
    /// Bulk loads (migration, seeding, `replace_all`): the last duplicate wins.
    upsert: String,
    update: String,
    delete: String,
    clear: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        let t = schema::quote(table);
        Self {
            select_all: format!("SELECT data FROM {t} ORDER BY rowid"),
            select_by_id: format!("SELECT data FROM {t} WHERE id = ?1"),
            select_where: format!("SELECT data FROM {t} WHERE "),
            count: format!("SELECT COUNT(*) FROM {t}"),
            insert: format!(
                "INSERT INTO {t} (id, data, token, email, userId, updatedAt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            upsert: format!(
                "INSERT OR REPLACE INTO {t} (id, data, token, email, userId, updatedAt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            update: format!(
                "UPDATE {t} SET id = ?1, data = ?2, token = ?3, email = ?4, userId = ?5, updatedAt = ?6
                 WHERE id = ?7"
            ),
            delete: format!("DELETE FROM {t} WHERE id = ?1"),
            clear: format!("DELETE FROM {t}"),
        }
    }
}

#[derive(Debug)]
struct Caches {
    /// Bumped by every write so a read that raced it does not cache stale rows.
    epoch: u64,
    records: RecordCache,
    snapshot: SnapshotCache,
}

impl Caches {
    fn clear(&mut self) {
        self.epoch += 1;
        self.records.clear();
        self.snapshot.clear();
    }
}

/// Collection stored as one table in a shared SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    name: String,
    engine: Arc<SqliteEngine>,
    sql: Statements,
    caches: Mutex<Caches>,
}

impl SqliteStore {
    /// Open the table for `spec`, creating and migrating it as needed.
    pub fn open(
        engine: Arc<SqliteEngine>,
        spec: &CollectionSpec,
        data_dir: &Path,
        cache: CacheConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        if spec.shape != Shape::List {
            return Err(StoreError::wrong_shape(&spec.name, Shape::List, spec.shape));
        }
        schema::validate_table_name(&spec.name)?;

        let store = Self {
            name: spec.name.clone(),
            sql: Statements::new(&spec.name),
            caches: Mutex::new(Caches {
                epoch: 0,
                records: RecordCache::new(cache.record_capacity),
                snapshot: SnapshotCache::new(cache.snapshot_ttl, clock),
            }),
            engine,
        };
        store.prepare_table(spec, &data_dir.join(spec.file_name()))?;
        Ok(store)
    }

    fn prepare_table(&self, spec: &CollectionSpec, json_path: &Path) -> Result<()> {
        self.engine.write(|conn| {
            let created = !schema::table_exists(conn, &self.name)?;
            let added = schema::ensure_collection_table(conn, &self.name)?;
            if !added.is_empty() && !created {
                info!(collection = %self.name, columns = ?added, "Added lookup columns");
            }

            let rows: i64 = conn.query_row(&self.sql.count, [], |row| row.get(0))?;
            if rows > 0 {
                return Ok(());
            }

            let source = if json_path.exists() {
                read_json_records(&self.name, json_path)
            } else if created {
                spec.seed().as_list().map(<[Record]>::to_vec)
            } else {
                None
            };

            if let Some(records) = source {
                let tx = conn.transaction()?;
                let loaded = self.insert_rows(&tx, &self.sql.upsert, records)?.len();
                tx.commit()?;
                info!(
                    collection = %self.name,
                    records = loaded,
                    from = %json_path.display(),
                    "Collection table populated"
                );
            }
            Ok(())
        })
    }

    fn insert_rows(
        &self,
        tx: &Transaction<'_>,
        sql: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let mut stmt = tx.prepare_cached(sql)?;
        let updated_at = now_millis();
        let mut inserted = Vec::with_capacity(records.len());
        for mut record in records {
            let id = record.ensure_id();
            let data = serde_json::to_string(&record)?;
            stmt.execute(params![
                id,
                data,
                record.token(),
                record.email(),
                record.user_id(),
                updated_at
            ])
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => StoreError::DuplicateId {
                    collection: self.name.clone(),
                    id: id.clone(),
                },
                _ => StoreError::from(e),
            })?;
            inserted.push(record);
        }
        Ok(inserted)
    }

    fn caches(&self) -> MutexGuard<'_, Caches> {
        lock(&self.caches)
    }

    /// Run a write and clear the caches.
    fn write<R>(&self, op: &'static str, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        metrics::record_operation(&self.name, op);
        let out = self.engine.write(f);
        self.caches().clear();
        out
    }

    fn select(&self, clause: &str, args: &[&str], limit_one: bool) -> Result<Vec<Record>> {
        let mut sql = format!("{}{clause} ORDER BY rowid", self.sql.select_where);
        if limit_one {
            sql.push_str(" LIMIT 1");
        }
        self.engine.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.iter().map(|data| parse_record(data)).collect()
        })
    }

    fn load_all(&self) -> Result<Arc<CollectionData>> {
        let epoch = {
            let caches = self.caches();
            if let Some(snapshot) = caches.snapshot.get() {
                return Ok(snapshot);
            }
            caches.epoch
        };

        let records = self.engine.read(|conn| {
            let mut stmt = conn.prepare_cached(&self.sql.select_all)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.iter().map(|data| parse_record(data)).collect::<Result<Vec<_>>>()
        })?;
        let snapshot = Arc::new(CollectionData::List(records));

        let mut caches = self.caches();
        if caches.epoch == epoch {
            caches.snapshot.put(Arc::clone(&snapshot));
        }
        debug!(collection = %self.name, rows = snapshot.len(), "Collection table loaded");
        Ok(snapshot)
    }

    fn lookup_id(&self, id: &str) -> Result<Option<Record>> {
        let epoch = {
            let mut caches = self.caches();
            if let Some(record) = caches.records.get(id) {
                return Ok(Some(record));
            }
            caches.epoch
        };

        let found = self.engine.read(|conn| {
            let mut stmt = conn.prepare_cached(&self.sql.select_by_id)?;
            let data: Option<String> = stmt.query_row([id], |row| row.get(0)).optional()?;
            data.as_deref().map(parse_record).transpose()
        })?;

        if let Some(record) = &found {
            let mut caches = self.caches();
            if caches.epoch == epoch {
                caches.records.put(id.to_string(), record.clone());
            }
        }
        Ok(found)
    }

    fn query(&self, query: &Query, limit_one: bool) -> Result<Vec<Record>> {
        match query.lookup() {
            Lookup::Id(id) => Ok(self.lookup_id(id)?.into_iter().collect()),
            Lookup::Email(email) => self.select("email = ?1", &[email], limit_one),
            Lookup::Token(token) => self.select("token = ?1", &[token], limit_one),
            Lookup::User(user) => self.select("userId = ?1", &[user], limit_one),
            Lookup::TokenAndUser(token, user) => {
                self.select("token = ?1 AND userId = ?2", &[token, user], limit_one)
            }
            Lookup::Scan => {
                let all = self.load_all()?;
                let matching = all
                    .as_list()
                    .unwrap_or_default()
                    .iter()
                    .filter(|r| query.matches_record(r));
                Ok(if limit_one {
                    matching.take(1).cloned().collect()
                } else {
                    matching.cloned().collect()
                })
            }
        }
    }
}

fn parse_record(data: &str) -> Result<Record> {
    Ok(serde_json::from_str(data)?)
}

/// Records of a JSON list file, or None if it cannot be used.
fn read_json_records(name: &str, path: &Path) -> Option<Vec<Record>> {
    let parsed = fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string()))
        .and_then(|value| CollectionData::from_value(Shape::List, value));
    match parsed {
        Ok(CollectionData::List(records)) => Some(records),
        Ok(CollectionData::Map(_)) => None,
        Err(reason) => {
            warn!(collection = %name, path = %path.display(), reason = %reason, "Skipping migration from unreadable JSON file");
            None
        }
    }
}

impl CollectionStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> Shape {
        Shape::List
    }

    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn find_all(&self) -> Result<Arc<CollectionData>> {
        metrics::record_operation(&self.name, "find_all");
        self.load_all()
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        metrics::record_operation(&self.name, "find_by_id");
        self.lookup_id(id)
    }

    fn find_one(&self, query: &Query) -> Result<Option<Record>> {
        metrics::record_operation(&self.name, "find_one");
        Ok(self.query(query, true)?.into_iter().next())
    }

    fn find(&self, query: &Query) -> Result<Vec<Record>> {
        metrics::record_operation(&self.name, "find");
        self.query(query, false)
    }

    fn create(&self, record: Record) -> Result<Record> {
        self.write("create", |conn| {
            let tx = conn.transaction()?;
            let mut inserted = self.insert_rows(&tx, &self.sql.insert, vec![record])?;
            tx.commit()?;
            Ok(inserted.remove(0))
        })
    }

    fn update(&self, id: &str, patch: Record) -> Result<Option<Record>> {
        self.write("update", |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .prepare_cached(&self.sql.select_by_id)?
                .query_row([id], |row| row.get(0))
                .optional()?;
            let Some(current) = current else {
                return Ok(None);
            };

            let mut record = parse_record(&current)?;
            record.merge(patch);
            if record.id().map_or(true, str::is_empty) {
                record.insert("id", id);
            }
            let new_id = record.id().unwrap_or(id).to_string();

            tx.prepare_cached(&self.sql.update)?.execute(params![
                new_id,
                serde_json::to_string(&record)?,
                record.token(),
                record.email(),
                record.user_id(),
                now_millis(),
                id
            ])?;
            tx.commit()?;
            Ok(Some(record))
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.write("delete", |conn| {
            let removed = conn.prepare_cached(&self.sql.delete)?.execute([id])?;
            Ok(removed > 0)
        })
    }

    fn insert_many(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        self.write("insert_many", |conn| {
            let tx = conn.transaction()?;
            let inserted = self.insert_rows(&tx, &self.sql.insert, records)?;
            tx.commit()?;
            Ok(inserted)
        })
    }

    fn delete_many(&self, query: &Query) -> Result<usize> {
        let doomed = self.query(query, false)?;
        if doomed.is_empty() {
            return Ok(0);
        }
        self.write("delete_many", |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare_cached(&self.sql.delete)?;
                for record in &doomed {
                    if let Some(id) = record.id() {
                        removed += stmt.execute([id])?;
                    }
                }
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    fn replace_all(&self, data: CollectionData) -> Result<()> {
        let CollectionData::List(records) = data else {
            return Err(StoreError::wrong_shape(&self.name, Shape::List, Shape::Map));
        };
        self.write("replace_all", |conn| {
            let tx = conn.transaction()?;
            tx.execute(&self.sql.clear, [])?;
            self.insert_rows(&tx, &self.sql.upsert, records)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn get(&self, _key: &str) -> Result<Option<Value>> {
        Err(StoreError::wrong_shape(&self.name, Shape::Map, Shape::List))
    }

    fn set(&self, _key: &str, _value: Value) -> Result<()> {
        Err(StoreError::wrong_shape(&self.name, Shape::Map, Shape::List))
    }

    fn count(&self) -> Result<usize> {
        metrics::record_operation(&self.name, "count");
        let rows: i64 = self
            .engine
            .read(|conn| Ok(conn.query_row(&self.sql.count, [], |row| row.get(0))?))?;
        Ok(usize::try_from(rows).unwrap_or_default())
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn flush(&self) -> Result<()> {
        self.engine.checkpoint()
    }

    fn invalidate(&self) {
        self.caches().clear();
    }
}
