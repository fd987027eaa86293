//! Store notification bridge.
//!
//! # Responsibilities
//! - Run one subscription loop per notification class
//! - Re-fetch the notified row and apply it to the cache
//! - Publish the committed mutation to cache observers
//! - Resubscribe with backoff and reconcile after reconnecting
//!
//! # Design Decisions
//! - The notification payload is never trusted; current state is re-fetched
//! - Fetch, mutation and publication are serialized by one writer gate, so
//!   observers see events in the order the cache applied them
//! - A failed notification is logged and skipped; the relay keeps serving
//!   the previous state rather than exiting

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::cache::{CacheEvent, ConfigCache};
use crate::config::SyncConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::timeouts::with_deadline;
use crate::store::{ChangeKind, Notification, NotificationStream, RecordStore, StoreError};
use crate::tenant::{DecodeError, Decoder};

/// Error type for applying a single notification or a resync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Counts from one full reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Subscription state of the three listeners.
#[derive(Debug, Default)]
pub struct ListenerStatus {
    added: AtomicBool,
    updated: AtomicBool,
    removed: AtomicBool,
}

impl ListenerStatus {
    fn flag(&self, kind: ChangeKind) -> &AtomicBool {
        match kind {
            ChangeKind::Added => &self.added,
            ChangeKind::Updated => &self.updated,
            ChangeKind::Removed => &self.removed,
        }
    }

    fn set(&self, kind: ChangeKind, connected: bool) {
        self.flag(kind).store(connected, Ordering::SeqCst);
        metrics::record_listener_connected(kind.channel(), connected);
    }

    /// Whether the listener for `kind` currently holds a subscription.
    pub fn is_connected(&self, kind: ChangeKind) -> bool {
        self.flag(kind).load(Ordering::SeqCst)
    }

    /// Listeners that are not subscribed. Non-empty means the cache may be stale.
    pub fn degraded(&self) -> Vec<ChangeKind> {
        ChangeKind::ALL
            .into_iter()
            .filter(|kind| !self.is_connected(*kind))
            .collect()
    }
}

/// Drives cache mutations from store notifications.
pub struct NotificationBridge {
    store: Arc<dyn RecordStore>,
    cache: Arc<ConfigCache>,
    decoder: Decoder,
    config: SyncConfig,
    query_timeout: Duration,
    writer: Mutex<()>,
    status: Arc<ListenerStatus>,
}

impl NotificationBridge {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<ConfigCache>,
        decoder: Decoder,
        config: SyncConfig,
        query_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            decoder,
            config,
            query_timeout,
            writer: Mutex::new(()),
            status: Arc::new(ListenerStatus::default()),
        }
    }

    /// Shared handle to the listener status.
    pub fn status(&self) -> Arc<ListenerStatus> {
        self.status.clone()
    }

    /// Open one subscription per notification class.
    ///
    /// Called before the initial load so nothing published in between is
    /// lost. Classes that fail to subscribe are retried by their loop.
    pub async fn subscribe_all(&self) -> HashMap<ChangeKind, Box<dyn NotificationStream>> {
        let mut streams = HashMap::new();
        for kind in ChangeKind::ALL {
            match with_deadline(self.query_timeout, self.store.subscribe(kind)).await {
                Ok(stream) => {
                    streams.insert(kind, stream);
                }
                Err(e) => {
                    tracing::warn!(channel = %kind, error = %e, "Initial subscribe failed; listener will retry");
                }
            }
        }
        streams
    }

    /// Spawn the listener loops and, if configured, the periodic resync.
    pub fn spawn(
        self: &Arc<Self>,
        mut streams: HashMap<ChangeKind, Box<dyn NotificationStream>>,
        shutdown: &Shutdown,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for kind in ChangeKind::ALL {
            let bridge = self.clone();
            let stream = streams.remove(&kind);
            let shutdown = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                bridge.listen(kind, stream, shutdown).await;
            }));
        }

        if self.config.resync_interval_secs > 0 {
            let bridge = self.clone();
            let every = Duration::from_secs(self.config.resync_interval_secs);
            let shutdown = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                bridge.resync_periodically(every, shutdown).await;
            }));
        }

        handles
    }

    /// Apply one notification and return the event published for it.
    ///
    /// `Ok(None)` means nothing changed: a removal of an unknown id, or a
    /// row that vanished before it could be re-fetched.
    pub async fn handle(&self, notification: Notification) -> Result<Option<CacheEvent>, SyncError> {
        let _writer = self.writer.lock().await;

        let event = match notification.kind {
            ChangeKind::Added | ChangeKind::Updated => self.refresh(&notification).await?,
            ChangeKind::Removed => self.cache.remove(&notification.id).map(CacheEvent::Removed),
        };

        if let Some(event) = &event {
            self.cache.publish(event);
        }
        Ok(event)
    }

    async fn refresh(&self, notification: &Notification) -> Result<Option<CacheEvent>, SyncError> {
        let record = with_deadline(self.query_timeout, self.store.query_by_id(&notification.id)).await?;
        let Some(record) = record else {
            tracing::debug!(
                channel = %notification.kind,
                tenant_id = %notification.id,
                "Row no longer exists; waiting for its removal"
            );
            return Ok(None);
        };

        let config = Arc::new(self.decoder.decode(&record)?);

        let event = match self.cache.upsert(config.clone()) {
            Some(old) => {
                if notification.kind == ChangeKind::Added {
                    tracing::debug!(tenant_id = %config.id, "Added notification for a known id; treating as change");
                }
                CacheEvent::Changed { old, new: config }
            }
            None => {
                if notification.kind == ChangeKind::Updated {
                    tracing::debug!(tenant_id = %config.id, "Updated notification for an unknown id; treating as addition");
                }
                CacheEvent::Added(config)
            }
        };
        Ok(Some(event))
    }

    /// Reconcile the whole cache against the store.
    ///
    /// Publishes an event for every row that differs from the cache and
    /// removes ids the store no longer has. Rows that fail to decode keep
    /// their cached version.
    pub async fn resync(&self) -> Result<ResyncSummary, SyncError> {
        let _writer = self.writer.lock().await;

        let records = with_deadline(self.query_timeout, self.store.query_all()).await?;
        let mut summary = ResyncSummary::default();
        let mut seen = HashSet::new();

        for record in &records {
            seen.insert(record.id.clone());

            let config = match self.decoder.decode(record) {
                Ok(config) => Arc::new(config),
                Err(e) => {
                    tracing::warn!(tenant_id = %record.id, error = %e, "Resync skipped undecodable record");
                    summary.skipped += 1;
                    continue;
                }
            };

            if self.cache.get(&config.id).is_some_and(|cached| *cached == *config) {
                continue;
            }

            let event = match self.cache.upsert(config.clone()) {
                Some(old) => {
                    summary.changed += 1;
                    CacheEvent::Changed { old, new: config }
                }
                None => {
                    summary.added += 1;
                    CacheEvent::Added(config)
                }
            };
            self.cache.publish(&event);
        }

        for cached in self.cache.snapshot() {
            if seen.contains(&cached.id) {
                continue;
            }
            if let Some(old) = self.cache.remove(&cached.id) {
                summary.removed += 1;
                self.cache.publish(&CacheEvent::Removed(old));
            }
        }

        Ok(summary)
    }

    async fn resync_logged(&self) {
        match self.resync().await {
            Ok(summary) => {
                metrics::record_resync("ok");
                tracing::info!(
                    added = summary.added,
                    changed = summary.changed,
                    removed = summary.removed,
                    skipped = summary.skipped,
                    "Resynchronized configuration cache"
                );
            }
            Err(e) => {
                metrics::record_resync("failed");
                tracing::warn!(error = %e, "Resync failed; serving previous state");
            }
        }
    }

    async fn process(&self, notification: Notification) {
        let kind = notification.kind;
        let id = notification.id.clone();

        match self.handle(notification).await {
            Ok(Some(event)) => {
                metrics::record_notification(kind.channel(), "applied");
                tracing::debug!(channel = %kind, tenant_id = %id, event = event.label(), "Notification applied");
            }
            Ok(None) => {
                metrics::record_notification(kind.channel(), "ignored");
                tracing::debug!(channel = %kind, tenant_id = %id, "Notification changed nothing");
            }
            Err(e) => {
                metrics::record_notification(kind.channel(), "failed");
                tracing::warn!(
                    channel = %kind,
                    tenant_id = %id,
                    error = %e,
                    "Skipping notification; serving previous state"
                );
            }
        }
    }

    async fn listen(
        self: Arc<Self>,
        kind: ChangeKind,
        mut stream: Option<Box<dyn NotificationStream>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut backoff = Backoff::from_config(&self.config);
        let mut reconnecting = stream.is_none();

        loop {
            let mut active = match stream.take() {
                Some(active) => active,
                None => match with_deadline(self.query_timeout, self.store.subscribe(kind)).await {
                    Ok(active) => active,
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            channel = %kind,
                            error = %e,
                            attempt = backoff.attempts(),
                            delay = ?delay,
                            "Subscribe failed; retrying"
                        );
                        if sleep_or_shutdown(delay, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            self.status.set(kind, true);
            backoff.reset();
            tracing::info!(channel = %kind, "Listening for notifications");

            if reconnecting && self.config.resync_on_reconnect {
                self.resync_logged().await;
            }

            loop {
                tokio::select! {
                    received = active.recv() => match received {
                        Ok(notification) => self.process(notification).await,
                        Err(e) => {
                            tracing::warn!(channel = %kind, error = %e, "Notification stream failed; resubscribing");
                            break;
                        }
                    },
                    _ = shutdown.recv() => {
                        self.status.set(kind, false);
                        tracing::info!(channel = %kind, "Listener received shutdown signal, exiting loop");
                        return;
                    }
                }
            }

            self.status.set(kind, false);
            reconnecting = true;

            let delay = backoff.next_delay();
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        self.status.set(kind, false);
        tracing::info!(channel = %kind, "Listener received shutdown signal, exiting loop");
    }

    async fn resync_periodically(self: Arc<Self>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; startup already loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.resync_logged().await,
                _ = shutdown.recv() => {
                    tracing::info!("Periodic resync received shutdown signal, exiting loop");
                    return;
                }
            }
        }
    }
}

/// Sleep for `delay`; returns true if shutdown fired first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.recv() => true,
    }
}
