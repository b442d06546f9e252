//! Read caches for the SQLite-backed store.
//!
//! - [`RecordCache`]: bounded LRU of id -> record, filled lazily on lookup
//! - [`SnapshotCache`]: the whole table for a short TTL
//!
//! Both are cleared by the owning store on every write.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::clock::SharedClock;
use crate::record::{CollectionData, Record};

/// Cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Records kept in the LRU
    pub record_capacity: usize,
    /// Lifetime of a full-table snapshot
    pub snapshot_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            record_capacity: 1024,
            snapshot_ttl: Duration::from_secs(2),
        }
    }
}

impl CacheConfig {
    /// Create a CacheConfig from application config values.
    pub fn from_config(record_capacity: usize, snapshot_ttl_ms: u64) -> Self {
        Self {
            record_capacity,
            snapshot_ttl: Duration::from_millis(snapshot_ttl_ms),
        }
    }
}

/// Bounded LRU of records keyed by id.
#[derive(Debug)]
pub struct RecordCache {
    entries: LruCache<String, Record>,
}

impl RecordCache {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, id: &str) -> Option<Record> {
        self.entries.get(id).cloned()
    }

    pub fn put(&mut self, id: String, record: Record) {
        self.entries.put(id, record);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One full-collection snapshot with a TTL.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    clock: SharedClock,
    entry: Option<(Instant, Arc<CollectionData>)>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            entry: None,
        }
    }

    /// The snapshot, if younger than the TTL.
    pub fn get(&self) -> Option<Arc<CollectionData>> {
        let (stored_at, data) = self.entry.as_ref()?;
        if self.clock.now().saturating_duration_since(*stored_at) < self.ttl {
            Some(Arc::clone(data))
        } else {
            None
        }
    }

    pub fn put(&mut self, data: Arc<CollectionData>) {
        self.entry = Some((self.clock.now(), data));
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::Shape;

    #[test]
    fn test_record_cache_evicts_least_recent() {
        let mut cache = RecordCache::new(2);
        cache.put("a".into(), Record::new().with("id", "a"));
        cache.put("b".into(), Record::new().with("id", "b"));

        // Touch a so b becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.put("c".into(), Record::new().with("id", "c"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_record_cache_zero_capacity() {
        let mut cache = RecordCache::new(0);
        cache.put("a".into(), Record::new());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_expires_with_clock() {
        let clock = Arc::new(ManualClock::new());
        let mut cache = SnapshotCache::new(Duration::from_secs(2), clock.clone());
        cache.put(Arc::new(CollectionData::empty(Shape::List)));

        clock.advance(Duration::from_millis(1999));
        assert!(cache.get().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_snapshot_clear() {
        let mut cache = SnapshotCache::new(Duration::from_secs(60), crate::clock::system());
        cache.put(Arc::new(CollectionData::empty(Shape::Map)));
        cache.clear();
        assert!(cache.get().is_none());
    }
}
