//! In-memory lookup cache with a fixed time-to-live.
//!
//! Entries are evicted lazily: an entry older than the TTL is removed the
//! next time it is looked up, regardless of how often it was read before.
//! There is no background sweeper.
//!
//! One instance is meant to be created per process and shared by reference
//! (or `Arc`) with whatever needs it.
//!
//! # Example
//!
//! ```
//! use depscan::ExpiringCache;
//!
//! let cache: ExpiringCache<String> = ExpiringCache::new();
//! cache.store("lodash@4.17.21", "{}".to_string());
//! assert_eq!(cache.lookup("lodash@4.17.21"), Some("{}".to_string()));
//! assert_eq!(cache.lookup("lodash"), None);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, Instant};

/// Cache TTL: 60 minutes.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// A thread-safe key/value cache whose entries expire after a fixed TTL.
///
/// The value and its insertion time are stored together under one lock, so
/// a reader never sees a fresh value paired with a stale timestamp.
pub struct ExpiringCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    /// Creates an empty cache with the standard 60-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is younger than the TTL.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn lookup(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;

        if entry.inserted_at.elapsed() < self.ttl {
            return Some(entry.value.clone());
        }

        entries.remove(key);
        None
    }

    /// Inserts or overwrites `key`, stamping it with the current time.
    pub fn store(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        self.lock().insert(key.into(), entry);
    }

    /// Number of stored entries, expired ones included until looked up.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while holding the lock cannot leave an entry half-written,
    // so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
