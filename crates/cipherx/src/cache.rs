//! Short-lived key/value cache with per-entry expiry.
//!
//! Expiry is checked lazily: a read past an entry's deadline behaves like a
//! miss and removes the entry. There is no background sweep and nothing is
//! persisted. Concurrent writers to the same key race; the last `set` wins.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::clock::{Clock, SystemClock};

/// One cache shared by every upstream collaborator, holding JSON payloads.
pub type SharedCache = TtlCache<serde_json::Value>;

/// A cached value and its absolute deadline.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// TTL cache keyed by string.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache on a specific clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Store `value` under `key` until `now + ttl_minutes`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_minutes: u64) {
        let ttl = Duration::minutes(i64::try_from(ttl_minutes).unwrap_or(i64::MAX / 60_000));
        self.set_for(key, value, ttl);
    }

    /// Store `value` under `key` for an arbitrary duration.
    pub fn set_for(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.lock().insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Fetch a live value, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => now > entry.expires_at,
        };

        if expired {
            trace!(key, "Evicting stale cache entry");
            entries.remove(key);
            return None;
        }

        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove one key.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `key` is physically stored, without checking expiry.
    pub fn contains_raw(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
