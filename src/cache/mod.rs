//! Configuration cache subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RecordStore::query_all → Decoder → ConfigCache::load
//!     → ConfigCache::for_all (seed the dispatch table)
//!
//! Steady state (driven by the notification bridge):
//!     upsert / remove (atomic swap under the map lock)
//!     → publish(CacheEvent) outside the lock
//!     → observers (dispatch table, metrics)
//! ```
//!
//! # Design Decisions
//! - The id-keyed map is the single source of truth
//! - Mutations return the prior value from the same critical section
//! - Observers form an ordered list; registering never replaces anyone
//! - Observers run outside the map lock and cannot roll a mutation back

mod observer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::observability::metrics;
use crate::store::{RecordStore, StoreError};
use crate::tenant::{Configuration, Decoder};

pub use observer::{CacheEvent, CacheObserver};
use observer::{FnObserver, ObserverList};

/// Error type for the initial bulk load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to query tenant records: {0}")]
    Store(#[from] StoreError),
}

/// Authoritative id-keyed map of tenant configurations.
#[derive(Default)]
pub struct ConfigCache {
    entries: Mutex<HashMap<String, Arc<Configuration>>>,
    observers: ObserverList,
}

impl ConfigCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the cache from every persisted record.
    ///
    /// A query failure is fatal. Records that fail to decode are logged and
    /// skipped. No events are published; seed consumers with [`for_all`].
    ///
    /// [`for_all`]: ConfigCache::for_all
    pub async fn load(&self, store: &dyn RecordStore, decoder: &Decoder) -> Result<usize, LoadError> {
        let records = store.query_all().await?;
        let total = records.len();
        let mut loaded = 0;

        for record in &records {
            match decoder.decode(record) {
                Ok(config) => {
                    self.lock().insert(config.id.clone(), Arc::new(config));
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(tenant_id = %record.id, error = %e, "Skipping undecodable record");
                }
            }
        }

        let size = self.len();
        metrics::record_tenant_count(size);
        tracing::info!(records = total, loaded, tenants = size, "Configuration cache loaded");
        Ok(loaded)
    }

    /// Visit every configuration under the map lock.
    ///
    /// Must not be called from an observer or any other mutation path.
    pub fn for_all<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<Configuration>),
    {
        let entries = self.lock();
        for config in entries.values() {
            visit(config);
        }
    }

    /// Point-in-time copy of every configuration.
    pub fn snapshot(&self) -> Vec<Arc<Configuration>> {
        self.lock().values().cloned().collect()
    }

    /// Look up one configuration by id.
    pub fn get(&self, id: &str) -> Option<Arc<Configuration>> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a configuration, returning the one it replaced.
    pub fn upsert(&self, config: Arc<Configuration>) -> Option<Arc<Configuration>> {
        let (previous, size) = {
            let mut entries = self.lock();
            let previous = entries.insert(config.id.clone(), config);
            (previous, entries.len())
        };
        metrics::record_tenant_count(size);
        previous
    }

    /// Remove a configuration, returning it if it existed.
    pub fn remove(&self, id: &str) -> Option<Arc<Configuration>> {
        let (removed, size) = {
            let mut entries = self.lock();
            let removed = entries.remove(id);
            (removed, entries.len())
        };
        metrics::record_tenant_count(size);
        removed
    }

    /// Register an observer. Observers are called in registration order.
    pub fn subscribe(&self, observer: Arc<dyn CacheObserver>) {
        self.observers.push(observer);
    }

    /// Register a closure for additions.
    pub fn on_addition<F>(&self, f: F)
    where
        F: Fn(&Arc<Configuration>) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnObserver::Addition(Box::new(f))));
    }

    /// Register a closure for changes, receiving `(old, new)`.
    pub fn on_change<F>(&self, f: F)
    where
        F: Fn(&Arc<Configuration>, &Arc<Configuration>) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnObserver::Change(Box::new(f))));
    }

    /// Register a closure for deletions.
    pub fn on_delete<F>(&self, f: F)
    where
        F: Fn(&Arc<Configuration>) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnObserver::Delete(Box::new(f))));
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver a committed mutation to every observer.
    ///
    /// Never called with the map lock held.
    pub fn publish(&self, event: &CacheEvent) {
        tracing::debug!(event = event.label(), tenant_id = %event.tenant_id(), "Publishing cache event");
        self.observers.dispatch(event);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Configuration>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::MemoryStore;
    use crate::tenant::OperationalParams;

    fn config(id: &str, subdomain: &str) -> Arc<Configuration> {
        Arc::new(Configuration {
            id: id.into(),
            name: String::new(),
            hostname: format!("{}.example.com", subdomain),
            secret: "s".into(),
            filtering_enabled: false,
            auto_reply: false,
            webhook_filters: Vec::new(),
            poll_reply_filters: Vec::new(),
            params: OperationalParams::default(),
        })
    }

    #[test]
    fn test_upsert_returns_previous() {
        let cache = ConfigCache::new();
        assert!(cache.upsert(config("t1", "acme")).is_none());

        let old = cache.upsert(config("t1", "acme2")).unwrap();
        assert_eq!(old.hostname, "acme.example.com");
        assert_eq!(cache.get("t1").unwrap().hostname, "acme2.example.com");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let cache = ConfigCache::new();
        cache.upsert(config("t1", "acme"));

        assert!(cache.remove("missing").is_none());
        assert_eq!(cache.len(), 1);

        assert!(cache.remove("t1").is_some());
        assert!(cache.remove("t1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_observers_all_receive_events() {
        let cache = ConfigCache::new();
        let additions = Arc::new(AtomicUsize::new(0));
        let deletions = Arc::new(AtomicUsize::new(0));

        let a1 = additions.clone();
        cache.on_addition(move |_| {
            a1.fetch_add(1, Ordering::SeqCst);
        });
        let a2 = additions.clone();
        cache.on_addition(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let d = deletions.clone();
        cache.on_delete(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        cache.publish(&CacheEvent::Added(config("t1", "acme")));
        cache.publish(&CacheEvent::Removed(config("t1", "acme")));

        assert_eq!(cache.observer_count(), 3);
        assert_eq!(additions.load(Ordering::SeqCst), 2);
        assert_eq!(deletions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let cache = ConfigCache::new();
        let seen = Arc::new(AtomicUsize::new(0));

        cache.on_change(|_, _| panic!("observer failure"));
        let s = seen.clone();
        cache.on_change(move |old, new| {
            assert_ne!(old.hostname, new.hostname);
            s.fetch_add(1, Ordering::SeqCst);
        });

        cache.upsert(config("t1", "acme2"));
        cache.publish(&CacheEvent::Changed {
            old: config("t1", "acme"),
            new: config("t1", "acme2"),
        });

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("t1").unwrap().hostname, "acme2.example.com");
    }

    #[test]
    fn test_observer_may_read_cache() {
        let cache = Arc::new(ConfigCache::new());
        let reader = cache.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        cache.on_addition(move |config| {
            if reader.get(&config.id).is_some() {
                s.fetch_add(1, Ordering::SeqCst);
            }
        });

        let c = config("t1", "acme");
        cache.upsert(c.clone());
        cache.publish(&CacheEvent::Added(c));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_upsert_never_exposes_missing_entry() {
        let cache = Arc::new(ConfigCache::new());
        cache.upsert(config("t1", "acme"));

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..2_000 {
                    let subdomain = if i % 2 == 0 { "acme2" } else { "acme" };
                    let previous = cache.upsert(config("t1", subdomain));
                    assert!(previous.is_some());
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..2_000 {
                        assert!(cache.get("t1").is_some());
                        assert_eq!(cache.len(), 1);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.get("t1").unwrap().hostname, "acme.example.com");
    }

    #[tokio::test]
    async fn test_load_skips_bad_records() {
        let store = MemoryStore::new();
        store.put("t1", br#"{"subdomain": "acme", "secret": "a"}"#.to_vec());
        store.put("t2", br#"{"subdomain": "beta", "secret": "b"}"#.to_vec());
        store.put("t3", b"garbage".to_vec());

        let cache = ConfigCache::new();
        let decoder = Decoder::new("example.com", OperationalParams::default());
        let loaded = cache.load(&store, &decoder).await.unwrap();

        assert_eq!(loaded, 2);
        let mut ids = Vec::new();
        cache.for_all(|c| ids.push(c.id.clone()));
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_load_fails_when_store_is_down() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let cache = ConfigCache::new();
        let decoder = Decoder::new("example.com", OperationalParams::default());
        assert!(matches!(cache.load(&store, &decoder).await, Err(LoadError::Store(_))));
        assert!(cache.is_empty());
    }
}
