//! Cache change observers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::tenant::Configuration;

/// A committed cache mutation.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Added(Arc<Configuration>),
    Changed {
        old: Arc<Configuration>,
        new: Arc<Configuration>,
    },
    Removed(Arc<Configuration>),
}

impl CacheEvent {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CacheEvent::Added(_) => "added",
            CacheEvent::Changed { .. } => "changed",
            CacheEvent::Removed(_) => "removed",
        }
    }

    /// Id of the affected tenant.
    pub fn tenant_id(&self) -> &str {
        match self {
            CacheEvent::Added(config) | CacheEvent::Removed(config) => &config.id,
            CacheEvent::Changed { new, .. } => &new.id,
        }
    }
}

/// Receives cache events after they are committed.
///
/// Called outside the cache lock; implementations may read the cache.
pub trait CacheObserver: Send + Sync {
    fn on_addition(&self, _config: &Arc<Configuration>) {}

    fn on_change(&self, _old: &Arc<Configuration>, _new: &Arc<Configuration>) {}

    fn on_delete(&self, _old: &Arc<Configuration>) {}
}

type AdditionFn = dyn Fn(&Arc<Configuration>) + Send + Sync;
type ChangeFn = dyn Fn(&Arc<Configuration>, &Arc<Configuration>) + Send + Sync;
type DeleteFn = dyn Fn(&Arc<Configuration>) + Send + Sync;

/// Adapts a single closure into an observer.
pub(crate) enum FnObserver {
    Addition(Box<AdditionFn>),
    Change(Box<ChangeFn>),
    Delete(Box<DeleteFn>),
}

impl CacheObserver for FnObserver {
    fn on_addition(&self, config: &Arc<Configuration>) {
        if let FnObserver::Addition(f) = self {
            f(config);
        }
    }

    fn on_change(&self, old: &Arc<Configuration>, new: &Arc<Configuration>) {
        if let FnObserver::Change(f) = self {
            f(old, new);
        }
    }

    fn on_delete(&self, old: &Arc<Configuration>) {
        if let FnObserver::Delete(f) = self {
            f(old);
        }
    }
}

/// Ordered list of subscribers.
#[derive(Default)]
pub(crate) struct ObserverList {
    observers: RwLock<Vec<Arc<dyn CacheObserver>>>,
}

impl ObserverList {
    pub(crate) fn push(&self, observer: Arc<dyn CacheObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver an event to every observer in registration order.
    ///
    /// A panicking observer is logged and skipped; the rest still run.
    pub(crate) fn dispatch(&self, event: &CacheEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, observer) in observers.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| match event {
                CacheEvent::Added(config) => observer.on_addition(config),
                CacheEvent::Changed { old, new } => observer.on_change(old, new),
                CacheEvent::Removed(old) => observer.on_delete(old),
            }));

            if outcome.is_err() {
                tracing::error!(
                    observer = index,
                    event = event.label(),
                    tenant_id = %event.tenant_id(),
                    "Cache observer panicked; continuing"
                );
            }
        }
    }
}
