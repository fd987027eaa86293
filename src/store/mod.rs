//! Durable store access.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RecordStore::query_all → cache load
//!
//! Steady state:
//!     NOTIFY added/updated/removed (payload = row id)
//!     → NotificationStream::recv
//!     → bridge re-fetches via RecordStore::query_by_id
//! ```
//!
//! # Design Decisions
//! - The store is a black box: row lookup plus three notification channels
//! - Notifications carry only the id; current state is always re-fetched
//! - A stream never hides a lost connection; it returns an error so the
//!   bridge resubscribes and reconciles what it may have missed

pub mod memory;
pub mod postgres;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// One persisted tenant row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub id: String,
    pub blob: Vec<u8>,
}

impl PersistedRecord {
    pub fn new(id: impl Into<String>, blob: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            blob: blob.into(),
        }
    }
}

/// The three notification classes published by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Added, ChangeKind::Updated, ChangeKind::Removed];

    /// Name of the notification channel.
    pub fn channel(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Updated => "updated",
            ChangeKind::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

/// A row-level change signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: ChangeKind,
    pub id: String,
}

impl Notification {
    pub fn new(kind: ChangeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row is missing column {column}: {reason}")]
    Row { column: &'static str, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query timed out after {0:?}")]
    Timeout(Duration),

    #[error("notification connection for {0} lost")]
    Disconnected(ChangeKind),

    #[error("notification channel {0} closed")]
    ChannelClosed(ChangeKind),

    #[error("notification channel {channel} dropped {skipped} messages")]
    Lagged { channel: ChangeKind, skipped: u64 },
}

/// Row lookup and change subscription surface of the durable store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every persisted tenant row.
    async fn query_all(&self) -> Result<Vec<PersistedRecord>, StoreError>;

    /// Fetch one row, or `None` if it no longer exists.
    async fn query_by_id(&self, id: &str) -> Result<Option<PersistedRecord>, StoreError>;

    /// Open a subscription to one notification class.
    async fn subscribe(&self, kind: ChangeKind) -> Result<Box<dyn NotificationStream>, StoreError>;
}

/// A live subscription to one notification class.
#[async_trait]
pub trait NotificationStream: Send {
    /// Wait for the next notification. Waits indefinitely while the store is quiet.
    async fn recv(&mut self) -> Result<Notification, StoreError>;
}
