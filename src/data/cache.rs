use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::utils::{Clock, SystemClock};

#[cfg(debug_assertions)]
use crate::config::DF;

struct CacheEntry<V> {
    value: V,
    expires_at_ms: i64,
}

/// Shared TTL cache consulted by every fetch strategy.
///
/// Expiry is enforced lazily at read time: an expired entry may sit in memory
/// until the next `get` touches it, at which point it is dropped rather than
/// resurrected. There is no background eviction thread.
#[derive(Clone)]
pub struct CacheStore<V: Clone> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Returns the cached value, or None when the key is missing or past its
    /// TTL. Never fails; a miss simply means the caller refetches.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        let now = self.clock.now_ms();

        match entries.get(key) {
            Some(entry) if now <= entry.expires_at_ms => {
                #[cfg(debug_assertions)]
                if DF.log_cache {
                    log::debug!("cache: hit [{}]", key);
                }
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                #[cfg(debug_assertions)]
                if DF.log_cache {
                    log::debug!("cache: expired entry dropped [{}]", key);
                }
                None
            }
            None => None,
        }
    }

    /// Unconditionally overwrites any existing entry for `key`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let expires_at_ms = self.clock.now_ms() + ttl.as_millis() as i64;

        self.entries
            .lock()
            .unwrap()
            .insert(key, CacheEntry { value, expires_at_ms });
    }

    /// Entry count, expired stragglers included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Wipe everything (canvas teardown).
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn store_at(start_ms: i64) -> (CacheStore<String>, ManualClock) {
        let clock = ManualClock::new(start_ms);
        let store = CacheStore::with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn get_right_after_set_returns_value() {
        let (store, _clock) = store_at(0);

        store.set("portfolio:w1", "P".to_string(), Duration::from_secs(30));
        assert_eq!(store.get("portfolio:w1"), Some("P".to_string()));
    }

    #[test]
    fn entry_expires_after_ttl_without_eviction_pass() {
        let (store, clock) = store_at(0);

        store.set("portfolio:w1", "P".to_string(), Duration::from_secs(30));

        // Entry is still in memory, but a read past the TTL is a miss.
        clock.advance_secs(31);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("portfolio:w1"), None);

        // The read dropped the stale entry instead of resurrecting it.
        assert!(store.is_empty());
    }

    #[test]
    fn value_survives_up_to_the_ttl_boundary() {
        let (store, clock) = store_at(1_000);

        store.set("q", "v".to_string(), Duration::from_secs(10));
        clock.advance_secs(10);
        assert_eq!(store.get("q"), Some("v".to_string()));

        clock.advance_ms(1);
        assert_eq!(store.get("q"), None);
    }

    #[test]
    fn set_overwrites_existing_entry_and_ttl() {
        let (store, clock) = store_at(0);

        store.set("k", "old".to_string(), Duration::from_secs(5));
        store.set("k", "new".to_string(), Duration::from_secs(60));

        clock.advance_secs(30);
        assert_eq!(store.get("k"), Some("new".to_string()));
    }

    #[test]
    fn clear_wipes_all_entries() {
        let (store, _clock) = store_at(0);

        store.set("a", "1".to_string(), Duration::from_secs(10));
        store.set("b", "2".to_string(), Duration::from_secs(10));
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get("a"), None);
    }
}
