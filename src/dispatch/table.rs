//! Hostname-keyed dispatch table.
//!
//! # Responsibilities
//! - Project the cache onto `hostname → (Configuration, handlers)`
//! - Follow cache events, including hostname renames
//! - Resolve and authorize inbound requests
//!
//! # Design Decisions
//! - One map holds config and handlers together, so they can never disagree
//! - A rename evicts the old key and inserts the new one in one critical section
//! - Evictions only remove an entry still owned by the same tenant id
//! - Handlers are built before the table lock is taken

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::cache::{CacheObserver, ConfigCache};
use crate::dispatch::handler::{Action, HandlerBuilder, TenantHandlers};
use crate::tenant::Configuration;

/// A resolved tenant: its configuration and handler capability.
#[derive(Clone)]
pub struct TenantRoute {
    pub config: Arc<Configuration>,
    pub handlers: Arc<dyn TenantHandlers>,
}

impl std::fmt::Debug for TenantRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRoute")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Why a request could not be routed to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("request has no usable host")]
    MissingHost,

    #[error("no secret supplied for {action} on {hostname}")]
    MissingSecret { hostname: String, action: Action },

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("secret mismatch for {0}")]
    SecretMismatch(String),
}

/// Derived `hostname → tenant` projection of the cache.
pub struct DispatchTable {
    routes: Mutex<HashMap<String, TenantRoute>>,
    builder: Arc<dyn HandlerBuilder>,
}

impl DispatchTable {
    /// Create an empty table using `builder` for handler capabilities.
    pub fn new(builder: Arc<dyn HandlerBuilder>) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            builder,
        }
    }

    /// Populate the table from the current cache contents.
    ///
    /// The cache is copied first so its lock is released before handlers are
    /// built and the table lock is taken.
    pub fn seed(&self, cache: &ConfigCache) -> usize {
        let mut configs = Vec::new();
        cache.for_all(|config| configs.push(config.clone()));

        for config in &configs {
            tracing::info!(hostname = %config.hostname, tenant_id = %config.id, "Setting up tenant");
            self.insert(config);
        }
        self.len()
    }

    /// Insert or overwrite the entry for `config.hostname`.
    pub fn insert(&self, config: &Arc<Configuration>) {
        let route = self.build(config);
        self.lock().insert(config.hostname.clone(), route);
    }

    /// Replace `old` with `new`, evicting the old hostname on rename.
    pub fn replace(&self, old: &Arc<Configuration>, new: &Arc<Configuration>) {
        let route = self.build(new);
        let mut routes = self.lock();
        if old.hostname != new.hostname {
            evict_owned(&mut routes, &old.hostname, &old.id);
        }
        routes.insert(new.hostname.clone(), route);
    }

    /// Remove the entry for `old.hostname` if it still belongs to `old`.
    pub fn evict(&self, old: &Arc<Configuration>) {
        evict_owned(&mut self.lock(), &old.hostname, &old.id);
    }

    /// Look up the tenant serving `hostname`.
    pub fn resolve(&self, hostname: &str) -> Option<TenantRoute> {
        self.lock().get(hostname).cloned()
    }

    /// Resolve and check the request secret.
    ///
    /// The secret is checked for presence before the host is looked up, so an
    /// empty secret always yields the usage hint.
    pub fn authorize(&self, hostname: &str, action: Action, secret: &str) -> Result<TenantRoute, RouteError> {
        if secret.is_empty() {
            return Err(RouteError::MissingSecret {
                hostname: hostname.to_string(),
                action,
            });
        }

        let route = self
            .resolve(hostname)
            .ok_or_else(|| RouteError::UnknownHost(hostname.to_string()))?;

        if route.config.secret == secret {
            Ok(route)
        } else {
            Err(RouteError::SecretMismatch(hostname.to_string()))
        }
    }

    /// Currently routable hostnames, sorted.
    pub fn hostnames(&self) -> Vec<String> {
        let mut hostnames: Vec<String> = self.lock().keys().cloned().collect();
        hostnames.sort();
        hostnames
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(&self, config: &Arc<Configuration>) -> TenantRoute {
        TenantRoute {
            config: config.clone(),
            handlers: self.builder.build(config),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TenantRoute>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn evict_owned(routes: &mut HashMap<String, TenantRoute>, hostname: &str, id: &str) {
    match routes.get(hostname) {
        Some(route) if route.config.id == id => {
            routes.remove(hostname);
        }
        Some(route) => {
            tracing::warn!(
                hostname = %hostname,
                tenant_id = %id,
                owner = %route.config.id,
                "Hostname now owned by another tenant; keeping its entry"
            );
        }
        None => {}
    }
}

impl CacheObserver for DispatchTable {
    fn on_addition(&self, config: &Arc<Configuration>) {
        tracing::info!(hostname = %config.hostname, tenant_id = %config.id, "Setting up tenant");
        self.insert(config);
    }

    fn on_change(&self, old: &Arc<Configuration>, new: &Arc<Configuration>) {
        if old.hostname != new.hostname {
            tracing::info!(from = %old.hostname, to = %new.hostname, tenant_id = %new.id, "Renaming tenant");
        } else {
            tracing::info!(hostname = %new.hostname, tenant_id = %new.id, "Changing tenant");
        }
        self.replace(old, new);
    }

    fn on_delete(&self, old: &Arc<Configuration>) {
        tracing::info!(hostname = %old.hostname, tenant_id = %old.id, "Removing tenant");
        self.evict(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEvent;
    use crate::dispatch::handler::TryLaterBuilder;
    use crate::tenant::OperationalParams;

    fn config(id: &str, subdomain: &str, secret: &str) -> Arc<Configuration> {
        Arc::new(Configuration {
            id: id.into(),
            name: String::new(),
            hostname: format!("{}.example.com", subdomain),
            secret: secret.into(),
            filtering_enabled: false,
            auto_reply: false,
            webhook_filters: Vec::new(),
            poll_reply_filters: Vec::new(),
            params: OperationalParams::default(),
        })
    }

    fn table() -> DispatchTable {
        DispatchTable::new(Arc::new(TryLaterBuilder))
    }

    #[test]
    fn test_seed_from_cache() {
        let cache = ConfigCache::new();
        cache.upsert(config("t1", "acme", "a"));
        cache.upsert(config("t2", "beta", "b"));

        let table = table();
        assert_eq!(table.seed(&cache), 2);
        assert_eq!(table.hostnames(), vec!["acme.example.com", "beta.example.com"]);
    }

    #[test]
    fn test_rename_evicts_old_hostname() {
        let table = table();
        let old = config("t1", "acme", "s3cr3t");
        let new = config("t1", "acme2", "s3cr3t");

        table.on_addition(&old);
        table.on_change(&old, &new);

        assert!(table.resolve("acme.example.com").is_none());
        let route = table.resolve("acme2.example.com").unwrap();
        assert_eq!(route.config.secret, "s3cr3t");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_change_without_rename_overwrites() {
        let table = table();
        table.on_addition(&config("t1", "acme", "old"));
        table.on_change(&config("t1", "acme", "old"), &config("t1", "acme", "new"));

        assert_eq!(table.resolve("acme.example.com").unwrap().config.secret, "new");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_removes_entry() {
        let table = table();
        let c = config("t1", "acme", "s");
        table.on_addition(&c);
        table.on_delete(&c);
        assert!(table.is_empty());
    }

    #[test]
    fn test_eviction_respects_new_owner() {
        let table = table();
        let t1 = config("t1", "acme", "one");
        let t2 = config("t2", "acme", "two");

        table.on_addition(&t1);
        // t2 takes over the hostname before t1's removal is observed.
        table.on_addition(&t2);
        table.on_delete(&t1);

        assert_eq!(table.resolve("acme.example.com").unwrap().config.id, "t2");
    }

    #[test]
    fn test_authorize_outcomes() {
        let table = table();
        table.on_addition(&config("t1", "acme", "s3cr3t"));

        assert!(table.authorize("acme.example.com", Action::Webhook, "s3cr3t").is_ok());
        assert_eq!(
            table.authorize("acme.example.com", Action::Webhook, "wrong").unwrap_err(),
            RouteError::SecretMismatch("acme.example.com".into())
        );
        assert_eq!(
            table.authorize("other.example.com", Action::Poll, "s3cr3t").unwrap_err(),
            RouteError::UnknownHost("other.example.com".into())
        );
        assert_eq!(
            table.authorize("acme.example.com", Action::Reply, "").unwrap_err(),
            RouteError::MissingSecret {
                hostname: "acme.example.com".into(),
                action: Action::Reply,
            }
        );
    }

    #[test]
    fn test_subscribed_table_follows_cache_events() {
        let cache = ConfigCache::new();
        let table = Arc::new(table());
        cache.subscribe(table.clone());

        let old = config("t1", "acme", "s");
        let new = config("t1", "acme2", "s");
        cache.upsert(old.clone());
        cache.publish(&CacheEvent::Added(old.clone()));
        cache.upsert(new.clone());
        cache.publish(&CacheEvent::Changed { old, new: new.clone() });

        assert_eq!(table.hostnames(), vec!["acme2.example.com"]);
        cache.remove("t1");
        cache.publish(&CacheEvent::Removed(new));
        assert!(table.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rename_is_atomic_for_concurrent_readers() {
        let table = Arc::new(table());
        let acme = config("t1", "acme", "s");
        let acme2 = config("t1", "acme2", "s");
        table.on_addition(&acme);

        let writer = {
            let table = table.clone();
            tokio::spawn(async move {
                for i in 0..2_000 {
                    if i % 2 == 0 {
                        table.on_change(&acme, &acme2);
                    } else {
                        table.on_change(&acme2, &acme);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let table = table.clone();
                tokio::spawn(async move {
                    for _ in 0..2_000 {
                        let hostnames = table.hostnames();
                        assert_eq!(hostnames.len(), 1, "observed {:?}", hostnames);
                        assert!(hostnames[0] == "acme.example.com" || hostnames[0] == "acme2.example.com");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(table.hostnames(), vec!["acme.example.com"]);
    }
}
