// 🗃️ Query Cache - Time-bounded memoization of expensive query results
// Entries expire `ttl` after insertion. Time comes from an injectable clock so
// expiry is testable without sleeping. Failed computations are never cached.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default time-to-live for cached entries
pub const DEFAULT_TTL_SECONDS: i64 = 60;

// ============================================================================
// CLOCKS
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

// ============================================================================
// QUERY CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// Value returned by `get_or_try_insert_with`, flagged with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<V> {
    pub value: V,
    pub cached: bool,
}

#[derive(Debug)]
pub struct QueryCache<V, C: Clock = SystemClock> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    clock: C,
}

impl<V: Clone> QueryCache<V, SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<V: Clone> Default for QueryCache<V, SystemClock> {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECONDS))
    }
}

impl<V: Clone, C: Clock> QueryCache<V, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        QueryCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now - entry.inserted_at < self.ttl
    }

    /// Cached value for `key`, if present and not expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.read()
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: self.clock.now(),
        };
        self.write().insert(key.into(), entry);
    }

    /// Return the cached value, or compute, store and return a fresh one.
    ///
    /// Errors from `compute` are passed through and leave the cache untouched.
    /// The lock is not held while computing, so two callers racing on the same
    /// missing key may both compute; the later insert wins.
    pub fn get_or_try_insert_with<E, F>(&self, key: &str, compute: F) -> Result<Cached<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(Cached { value, cached: true });
        }

        let value = compute()?;
        self.insert(key, value.clone());
        Ok(Cached { value, cached: false })
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.inserted_at < self.ttl);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
