//! File-backed collection store.
//!
//! One JSON document per collection. Reads are served from an in-memory
//! snapshot that is reloaded once it is older than the cache window. Writes
//! mutate the snapshot synchronously and hand persistence to a debounced,
//! single-flight write queue; the physical write replaces the file atomically
//! on the blocking pool.
//!
//! Snapshots are `Arc<CollectionData>` and are mutated copy-on-write, so the
//! state lock is never held across serialization or disk I/O.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::atomic::{self, BACKUP_DIR};
use super::debounce::{DebounceConfig, Scheduled, TimerHandle, WriteQueue};
use super::index::Indexes;
use super::{lock, Backend, CollectionStore};
use crate::catalog::CollectionSpec;
use crate::clock::SharedClock;
use crate::error::{Result, StoreError};
use crate::observability::metrics;
use crate::query::{Lookup, Query};
use crate::record::{CollectionData, Record, Shape};

/// Settings for file-backed stores.
#[derive(Debug, Clone, Copy)]
pub struct FileStoreConfig {
    /// Age after which a read reloads the file
    pub cache_ttl: Duration,
    /// Write coalescing window
    pub debounce: DebounceConfig,
    /// Backups kept per collection
    pub backup_keep: usize,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            debounce: DebounceConfig::default(),
            backup_keep: 5,
        }
    }
}

/// Mutable per-collection state, guarded by one mutex.
#[derive(Debug)]
struct State {
    data: Arc<CollectionData>,
    /// Bumped on every accepted write and every reload.
    generation: u64,
    loaded_at: Instant,
    /// Set by `invalidate`; the next read reloads.
    stale: bool,
    /// Built lazily for the generation it is tagged with.
    indexes: Option<Indexes>,
    queue: WriteQueue<u64>,
}

impl State {
    /// Rebuild indexes if the data moved past them.
    fn refresh_indexes(&mut self) {
        if let CollectionData::List(records) = self.data.as_ref() {
            let current = self
                .indexes
                .as_ref()
                .is_some_and(|idx| idx.generation() == self.generation);
            if !current {
                self.indexes = Some(Indexes::build(records, self.generation));
            }
        }
    }

    fn records(&self) -> &[Record] {
        self.data.as_list().unwrap_or_default()
    }
}

#[derive(Debug)]
struct Inner {
    name: String,
    shape: Shape,
    seed: CollectionData,
    path: PathBuf,
    backups_root: PathBuf,
    config: FileStoreConfig,
    clock: SharedClock,
    state: Mutex<State>,
    /// Serializes physical writes to the temp file.
    io_lock: Mutex<()>,
    /// Newest generation known to match the file on disk.
    persisted: AtomicU64,
    disk_writes: AtomicU64,
}

/// Collection stored as `<data_dir>/<name>.json`.
#[derive(Debug)]
pub struct FileStore {
    inner: Arc<Inner>,
}

impl FileStore {
    /// Open the collection, creating its file from the seed if absent.
    ///
    /// Never fails: an unreadable or corrupt file is served as the seed.
    pub fn open(
        spec: &CollectionSpec,
        data_dir: &Path,
        config: FileStoreConfig,
        clock: SharedClock,
    ) -> Self {
        let seed = spec.seed();
        let now = clock.now();
        let inner = Arc::new(Inner {
            name: spec.name.clone(),
            shape: spec.shape,
            path: data_dir.join(spec.file_name()),
            backups_root: data_dir.join(BACKUP_DIR),
            config,
            clock,
            state: Mutex::new(State {
                data: Arc::new(seed.clone()),
                generation: 0,
                loaded_at: now,
                stale: true,
                indexes: None,
                queue: WriteQueue::new(config.debounce),
            }),
            seed,
            io_lock: Mutex::new(()),
            persisted: AtomicU64::new(0),
            disk_writes: AtomicU64::new(0),
        });

        {
            let mut state = inner.lock_state();
            inner.reload(&mut state);
        }
        Self { inner }
    }

    /// Path of the live collection file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of physical writes performed so far.
    pub fn disk_writes(&self) -> u64 {
        self.inner.disk_writes.load(Ordering::Acquire)
    }

    /// True when accepted writes have not reached disk yet.
    pub fn has_pending_writes(&self) -> bool {
        let state = self.inner.lock_state();
        self.inner.is_dirty(&state)
    }

    fn require(&self, expected: Shape) -> Result<()> {
        if self.inner.shape == expected {
            Ok(())
        } else {
            Err(StoreError::wrong_shape(
                &self.inner.name,
                expected,
                self.inner.shape,
            ))
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn is_dirty(&self, state: &State) -> bool {
        !state.queue.is_idle() || state.generation > self.persisted.load(Ordering::Acquire)
    }

    /// Reload if invalidated or past the cache window, unless there are
    /// writes the file does not hold yet.
    fn ensure_fresh(&self, state: &mut State) {
        let expired = self.clock.now().saturating_duration_since(state.loaded_at)
            >= self.config.cache_ttl;
        if (state.stale || expired) && !self.is_dirty(state) {
            self.reload(state);
        }
    }

    fn reload(&self, state: &mut State) {
        let data = self.load_from_disk();
        state.generation += 1;
        state.data = Arc::new(data);
        state.loaded_at = self.clock.now();
        state.stale = false;
        self.persisted.fetch_max(state.generation, Ordering::AcqRel);
        metrics::record_cache_reload(&self.name);
        debug!(collection = %self.name, generation = state.generation, "Collection loaded");
    }

    fn load_from_disk(&self) -> CollectionData {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.create_from_seed();
                return self.seed.clone();
            }
            Err(e) => {
                warn!(collection = %self.name, error = %e, "Failed to read collection file, using seed");
                return self.seed.clone();
            }
        };

        let parsed = serde_json::from_slice::<Value>(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|value| CollectionData::from_value(self.shape, value));
        match parsed {
            Ok(data) => data,
            Err(reason) => {
                warn!(
                    collection = %self.name,
                    path = %self.path.display(),
                    reason = %reason,
                    "Corrupt collection file, using seed"
                );
                self.seed.clone()
            }
        }
    }

    fn create_from_seed(&self) {
        let _io = lock(&self.io_lock);
        let written = serde_json::to_vec_pretty(&self.seed)
            .map_err(StoreError::from)
            .and_then(|bytes| atomic::write_atomic(&self.path, &bytes));
        match written {
            Ok(()) => info!(collection = %self.name, path = %self.path.display(), "Created collection file from seed"),
            Err(e) => error!(collection = %self.name, error = %e, "Failed to create collection file"),
        }
    }

    /// Apply a mutation to the snapshot and schedule persistence.
    ///
    /// `apply` returns its output and whether anything changed.
    fn mutate<R>(
        self: &Arc<Self>,
        op: &'static str,
        apply: impl FnOnce(&mut CollectionData) -> Result<(R, bool)>,
    ) -> Result<R> {
        metrics::record_operation(&self.name, op);

        let mut state = self.lock_state();
        self.ensure_fresh(&mut state);

        let (out, changed) = apply(Arc::make_mut(&mut state.data))?;
        if !changed {
            return Ok(out);
        }

        let now = self.clock.now();
        state.generation += 1;
        state.loaded_at = now;
        let generation = state.generation;

        let write_through = match state.queue.schedule(generation, now) {
            Scheduled::Armed(_) => match Handle::try_current() {
                Ok(runtime) => {
                    let timer = TimerHandle::new();
                    state.queue.arm(timer.clone());
                    let delay = state.queue.time_until_due(now).unwrap_or_default();
                    self.spawn_timer(&runtime, timer, delay);
                    false
                }
                Err(_) => true,
            },
            Scheduled::Coalesced | Scheduled::Queued => false,
        };
        drop(state);

        if write_through {
            if let Err(e) = self.flush() {
                error!(collection = %self.name, error = %e, "Failed to write collection file");
            }
        }
        Ok(out)
    }

    fn spawn_timer(self: &Arc<Self>, runtime: &Handle, timer: TimerHandle, delay: Duration) {
        let inner = Arc::clone(self);
        let cancelled = timer.token();
        runtime.spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(delay) => inner.drain_queue().await,
            }
        });
    }

    /// Write pending snapshots until the queue has no successor.
    async fn drain_queue(self: Arc<Self>) {
        loop {
            let (data, generation) = {
                let mut state = self.lock_state();
                if state.queue.begin().is_none() {
                    return;
                }
                debug!(
                    collection = %self.name,
                    scheduled = state.queue.scheduled(),
                    coalesced = state.queue.coalesced(),
                    "Collection write starting"
                );
                (Arc::clone(&state.data), state.generation)
            };

            let worker = Arc::clone(&self);
            let written =
                tokio::task::spawn_blocking(move || worker.persist(&data, generation)).await;
            match written {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(collection = %self.name, generation, error = %e, "Failed to write collection file");
                }
                Err(e) => {
                    error!(collection = %self.name, error = %e, "Collection writer task failed");
                }
            }

            if !self.lock_state().queue.complete() {
                return;
            }
        }
    }

    /// Write `data` unless the file already holds this generation or newer.
    fn persist(&self, data: &CollectionData, generation: u64) -> Result<bool> {
        let _io = lock(&self.io_lock);
        if generation <= self.persisted.load(Ordering::Acquire) {
            return Ok(false);
        }

        let started = Instant::now();
        let bytes = serde_json::to_vec_pretty(data)?;
        atomic::write_atomic(&self.path, &bytes)?;
        self.persisted.fetch_max(generation, Ordering::AcqRel);
        self.disk_writes.fetch_add(1, Ordering::AcqRel);

        let elapsed = started.elapsed();
        metrics::record_persist(&self.name, elapsed.as_secs_f64());
        debug!(
            collection = %self.name,
            generation,
            bytes = bytes.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Collection written"
        );
        Ok(true)
    }

    fn flush(&self) -> Result<()> {
        let (data, generation) = {
            let mut state = self.lock_state();
            state.queue.take_for_flush();
            (Arc::clone(&state.data), state.generation)
        };
        self.persist(&data, generation)?;
        Ok(())
    }

    fn read<R>(&self, op: &'static str, f: impl FnOnce(&mut State) -> R) -> R {
        metrics::record_operation(&self.name, op);
        let mut state = self.lock_state();
        self.ensure_fresh(&mut state);
        f(&mut state)
    }

    /// Verify an index candidate; scan on a miss or a stale position.
    fn verified<'a>(
        &self,
        records: &'a [Record],
        candidate: Option<usize>,
        matches: impl Fn(&Record) -> bool,
    ) -> Option<&'a Record> {
        if let Some(record) = candidate.and_then(|pos| records.get(pos)) {
            if matches(record) {
                return Some(record);
            }
        }
        metrics::record_index_fallback(&self.name);
        records.iter().find(|r| matches(r))
    }

    fn find_one_in(&self, state: &mut State, query: &Query) -> Option<Record> {
        let lookup = query.lookup();
        if lookup == Lookup::Scan {
            return state
                .records()
                .iter()
                .find(|r| query.matches_record(r))
                .cloned();
        }

        state.refresh_indexes();
        let Some(indexes) = state.indexes.as_ref() else {
            return None;
        };
        let records = state.data.as_list().unwrap_or_default();
        let found = match lookup {
            Lookup::Id(id) => self.verified(records, indexes.id(id), |r| r.id() == Some(id)),
            Lookup::Email(email) => {
                self.verified(records, indexes.email(email), |r| r.email() == Some(email))
            }
            Lookup::Token(token) => {
                self.verified(records, indexes.token(token), |r| r.token() == Some(token))
            }
            Lookup::TokenAndUser(token, user) => {
                self.verified(records, indexes.token(token), |r| {
                    r.token() == Some(token) && r.user_id() == Some(user)
                })
            }
            Lookup::User(user) => {
                let candidates = indexes.user(user);
                let first = candidates.first().copied();
                self.verified(records, first, |r| r.user_id() == Some(user))
            }
            Lookup::Scan => None,
        };
        found.cloned()
    }

    fn find_in(&self, state: &mut State, query: &Query) -> Vec<Record> {
        if let Lookup::User(user) = query.lookup() {
            state.refresh_indexes();
            if let Some(indexes) = state.indexes.as_ref() {
                let records = state.data.as_list().unwrap_or_default();
                let hits = indexes
                    .user(user)
                    .iter()
                    .map(|&pos| records.get(pos))
                    .collect::<Option<Vec<_>>>();
                if let Some(hits) = hits {
                    if hits.iter().all(|r| r.user_id() == Some(user)) {
                        return hits.into_iter().cloned().collect();
                    }
                }
                metrics::record_index_fallback(&self.name);
            }
        }

        state
            .records()
            .iter()
            .filter(|r| query.matches_record(r))
            .cloned()
            .collect()
    }
}

fn list_mut<'a>(name: &str, data: &'a mut CollectionData) -> Result<&'a mut Vec<Record>> {
    match data {
        CollectionData::List(records) => Ok(records),
        CollectionData::Map(_) => Err(StoreError::wrong_shape(name, Shape::List, Shape::Map)),
    }
}

fn map_mut<'a>(
    name: &str,
    data: &'a mut CollectionData,
) -> Result<&'a mut serde_json::Map<String, Value>> {
    match data {
        CollectionData::Map(map) => Ok(map),
        CollectionData::List(_) => Err(StoreError::wrong_shape(name, Shape::Map, Shape::List)),
    }
}

impl CollectionStore for FileStore {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn shape(&self) -> Shape {
        self.inner.shape
    }

    fn backend(&self) -> Backend {
        Backend::File
    }

    fn find_all(&self) -> Result<Arc<CollectionData>> {
        Ok(self.inner.read("find_all", |s| Arc::clone(&s.data)))
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        self.require(Shape::List)?;
        let query = Query::by_id(id);
        Ok(self
            .inner
            .read("find_by_id", |s| self.inner.find_one_in(s, &query)))
    }

    fn find_one(&self, query: &Query) -> Result<Option<Record>> {
        self.require(Shape::List)?;
        Ok(self
            .inner
            .read("find_one", |s| self.inner.find_one_in(s, query)))
    }

    fn find(&self, query: &Query) -> Result<Vec<Record>> {
        self.require(Shape::List)?;
        Ok(self.inner.read("find", |s| self.inner.find_in(s, query)))
    }

    fn create(&self, mut record: Record) -> Result<Record> {
        self.require(Shape::List)?;
        record.ensure_id();
        let name = &self.inner.name;
        self.inner.mutate("create", |data| {
            list_mut(name, data)?.push(record.clone());
            Ok((record, true))
        })
    }

    fn update(&self, id: &str, patch: Record) -> Result<Option<Record>> {
        self.require(Shape::List)?;
        let name = &self.inner.name;
        self.inner.mutate("update", |data| {
            let records = list_mut(name, data)?;
            match records.iter_mut().find(|r| r.id() == Some(id)) {
                Some(record) => {
                    record.merge(patch);
                    Ok((Some(record.clone()), true))
                }
                None => Ok((None, false)),
            }
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.inner.mutate("delete", |data| {
            let removed = match data {
                CollectionData::List(records) => {
                    match records.iter().position(|r| r.id() == Some(id)) {
                        Some(pos) => {
                            records.remove(pos);
                            true
                        }
                        None => false,
                    }
                }
                CollectionData::Map(map) => map.remove(id).is_some(),
            };
            Ok((removed, removed))
        })
    }

    fn insert_many(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        self.require(Shape::List)?;
        let mut records = records;
        for record in &mut records {
            record.ensure_id();
        }
        let name = &self.inner.name;
        self.inner.mutate("insert_many", |data| {
            let changed = !records.is_empty();
            list_mut(name, data)?.extend(records.iter().cloned());
            Ok((records, changed))
        })
    }

    fn delete_many(&self, query: &Query) -> Result<usize> {
        self.require(Shape::List)?;
        let name = &self.inner.name;
        self.inner.mutate("delete_many", |data| {
            let records = list_mut(name, data)?;
            let before = records.len();
            records.retain(|r| !query.matches_record(r));
            let removed = before - records.len();
            Ok((removed, removed > 0))
        })
    }

    fn replace_all(&self, replacement: CollectionData) -> Result<()> {
        self.require(replacement.shape())?;
        self.inner.mutate("replace_all", |data| {
            *data = replacement;
            Ok(((), true))
        })
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        self.require(Shape::Map)?;
        Ok(self.inner.read("get", |s| {
            s.data.as_map().and_then(|map| map.get(key)).cloned()
        }))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.require(Shape::Map)?;
        let name = &self.inner.name;
        self.inner.mutate("set", |data| {
            map_mut(name, data)?.insert(key.to_string(), value);
            Ok(((), true))
        })
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.read("count", |s| s.data.len()))
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        self.inner.flush()?;
        let copy = atomic::backup_file(
            &self.inner.path,
            &self.inner.backups_root,
            self.inner.config.backup_keep,
        )?;
        info!(collection = %self.inner.name, path = %copy.display(), "Collection backed up");
        Ok(Some(copy))
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn invalidate(&self) {
        let mut state = self.inner.lock_state();
        state.queue.discard();
        state.stale = true;
        // Unwritten changes are superseded by the external write.
        self.inner
            .persisted
            .fetch_max(state.generation, Ordering::AcqRel);
        debug!(collection = %self.inner.name, "Collection invalidated");
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.inner.flush() {
            warn!(collection = %self.inner.name, error = %e, "Failed to flush collection on drop");
        }
    }
}
