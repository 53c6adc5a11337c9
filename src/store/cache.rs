//! Bounded subject cache

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::DEFAULT_CACHE_MAX_SIZE;
use crate::schema::RegisteredSchema;

/// Least-recently-used cache of subject lookups.
///
/// Entries are only added after a lookup miss and are never invalidated; the
/// only removals are LRU eviction at capacity and explicit [`remove`](Self::remove).
/// Concurrent inserts for the same subject are allowed, the last one wins.
pub struct SubjectCache {
    entries: Mutex<LruCache<String, RegisteredSchema>>,
}

impl SubjectCache {
    /// Cache holding at most `capacity` subjects; zero falls back to the default size.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_MAX_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        // Start unbounded and shrink the limit so the map doesn't preallocate it.
        let mut entries = LruCache::unbounded();
        entries.resize(capacity);
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, subject: &str) -> Option<RegisteredSchema> {
        self.entries.lock().get(subject).cloned()
    }

    pub fn insert(&self, subject: impl Into<String>, schema: RegisteredSchema) {
        self.entries.lock().put(subject.into(), schema);
    }

    /// Evict `subject`, returning whether it was cached.
    pub fn remove(&self, subject: &str) -> bool {
        self.entries.lock().pop(subject).is_some()
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.entries.lock().contains(subject)
    }

    /// Cached subjects, most recently used first.
    pub fn subjects(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(subject, _)| subject.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl fmt::Debug for SubjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
