//! In-process record store.
//!
//! Backs tests and local runs without PostgreSQL. Writes publish to the
//! matching notification channel exactly like database triggers would.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::store::{ChangeKind, Notification, NotificationStream, PersistedRecord, RecordStore, StoreError};

const CHANNEL_CAPACITY: usize = 256;

/// Entry of a JSON seed file: `[{"id": "...", "blob": {...}}]`.
#[derive(Debug, Deserialize)]
struct SeedEntry {
    id: String,
    blob: serde_json::Value,
}

/// Thread-safe in-memory store with broadcast notifications.
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, Vec<u8>>>,
    channels: HashMap<ChangeKind, broadcast::Sender<String>>,
    connections: broadcast::Sender<()>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let channels = ChangeKind::ALL
            .iter()
            .map(|kind| (*kind, broadcast::channel(CHANNEL_CAPACITY).0))
            .collect();

        Self {
            rows: Mutex::new(BTreeMap::new()),
            channels,
            connections: broadcast::channel(1).0,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Create a store pre-populated from a JSON seed file.
    pub fn from_seed_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<SeedEntry> = serde_json::from_str(&content)?;

        let store = Self::new();
        for entry in entries {
            store.put(entry.id, entry.blob.to_string().into_bytes());
        }
        tracing::info!(path = ?path, rows = store.len(), "Seeded memory store");
        Ok(store)
    }

    /// Write a row without publishing a notification.
    pub fn put(&self, id: impl Into<String>, blob: impl Into<Vec<u8>>) {
        self.rows().insert(id.into(), blob.into());
    }

    /// Insert a row and publish `added`.
    pub fn insert(&self, id: impl Into<String>, blob: impl Into<Vec<u8>>) {
        let id = id.into();
        self.put(id.clone(), blob);
        self.notify(ChangeKind::Added, id);
    }

    /// Replace a row and publish `updated`.
    pub fn update(&self, id: impl Into<String>, blob: impl Into<Vec<u8>>) {
        let id = id.into();
        self.put(id.clone(), blob);
        self.notify(ChangeKind::Updated, id);
    }

    /// Delete a row and publish `removed`.
    pub fn delete(&self, id: &str) {
        self.rows().remove(id);
        self.notify(ChangeKind::Removed, id);
    }

    /// Publish a notification without touching the rows.
    pub fn notify(&self, kind: ChangeKind, id: impl Into<String>) {
        if let Some(tx) = self.channels.get(&kind) {
            // No subscribers is a valid state.
            let _ = tx.send(id.into());
        }
    }

    /// Break every open subscription, as a lost database connection would.
    ///
    /// Notifications published afterwards only reach new subscriptions.
    pub fn drop_connections(&self) {
        let _ = self.connections.send(());
    }

    /// Make every query fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions to one channel.
    pub fn subscriber_count(&self, kind: ChangeKind) -> usize {
        self.channels.get(&kind).map(|tx| tx.receiver_count()).unwrap_or(0)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query_all(&self) -> Result<Vec<PersistedRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .rows()
            .iter()
            .map(|(id, blob)| PersistedRecord::new(id.clone(), blob.clone()))
            .collect())
    }

    async fn query_by_id(&self, id: &str) -> Result<Option<PersistedRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .rows()
            .get(id)
            .map(|blob| PersistedRecord::new(id, blob.clone())))
    }

    async fn subscribe(&self, kind: ChangeKind) -> Result<Box<dyn NotificationStream>, StoreError> {
        self.check_available()?;
        let rx = self
            .channels
            .get(&kind)
            .map(|tx| tx.subscribe())
            .ok_or(StoreError::ChannelClosed(kind))?;
        Ok(Box::new(MemoryStream {
            kind,
            rx,
            dropped: self.connections.subscribe(),
        }))
    }
}

struct MemoryStream {
    kind: ChangeKind,
    rx: broadcast::Receiver<String>,
    dropped: broadcast::Receiver<()>,
}

#[async_trait]
impl NotificationStream for MemoryStream {
    async fn recv(&mut self) -> Result<Notification, StoreError> {
        tokio::select! {
            received = self.rx.recv() => match received {
                Ok(id) => Ok(Notification::new(self.kind, id)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => Err(StoreError::Lagged {
                    channel: self.kind,
                    skipped,
                }),
                Err(broadcast::error::RecvError::Closed) => Err(StoreError::ChannelClosed(self.kind)),
            },
            _ = self.dropped.recv() => Err(StoreError::Disconnected(self.kind)),
        }
    }
}
