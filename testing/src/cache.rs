//! In-memory cache with TTL expiry.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use helpdesk_core::cache::Cache;
use helpdesk_core::error::CacheError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Faults {
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
    fail_deletes: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
}

/// `HashMap`-backed [`Cache`].
///
/// Expiry uses `tokio::time::Instant`, so tests running with a paused clock
/// can advance past a TTL deterministically.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, (Vec<u8>, Instant)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    sets: Arc<AtomicUsize>,
    faults: Arc<Faults>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` holds an unexpired value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// The unexpired value stored under `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone())
    }

    /// Store bytes directly, e.g. a corrupt projection.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    /// Every key ever passed to `delete`, in order.
    #[must_use]
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Number of successful `set` calls.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Sorted snapshot of live keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<_> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Fail `get` calls.
    pub fn fail_gets(&self, fail: bool) {
        self.faults.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Fail `set` calls.
    pub fn fail_sets(&self, fail: bool) {
        self.faults.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Fail `delete` calls.
    pub fn fail_deletes(&self, fail: bool) {
        self.faults.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delay every `get` by `delay`.
    pub fn delay_gets(&self, delay: Option<Duration>) {
        *self.faults.get_delay.lock().unwrap() = delay;
    }
}

impl Cache for InMemoryCache {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let delay = *self.faults.get_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.faults.fail_gets.load(Ordering::SeqCst) {
                return Err(CacheError::Operation {
                    key,
                    reason: "injected get failure".to_string(),
                });
            }
            Ok(self.raw(&key))
        })
    }

    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            if self.faults.fail_sets.load(Ordering::SeqCst) {
                return Err(CacheError::Operation {
                    key,
                    reason: "injected set failure".to_string(),
                });
            }
            self.insert_raw(&key, value, ttl);
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn delete(
        &self,
        keys: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let keys = keys.to_vec();
        Box::pin(async move {
            if self.faults.fail_deletes.load(Ordering::SeqCst) {
                return Err(CacheError::Operation {
                    key: keys.first().cloned().unwrap_or_default(),
                    reason: "injected delete failure".to_string(),
                });
            }
            let mut entries = self.entries.lock().unwrap();
            for key in &keys {
                entries.remove(key);
            }
            self.deleted.lock().unwrap().extend(keys);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("ticket:1", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.contains("ticket:1"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("ticket:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_records_keys() {
        let cache = InMemoryCache::new();
        cache.insert_raw("a", vec![1], Duration::from_secs(5));
        cache
            .delete(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert!(!cache.contains("a"));
        assert_eq!(cache.deleted_keys(), ["a", "b"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let cache = InMemoryCache::new();
        cache.fail_gets(true);
        assert!(cache.get("x").await.is_err());
        cache.fail_deletes(true);
        assert!(cache.delete(&["x".to_string()]).await.is_err());
    }
}
