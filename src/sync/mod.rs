//! Store-to-cache synchronization.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     NotificationBridge::subscribe_all   (before the initial load)
//!     → ConfigCache::load
//!     → NotificationBridge::spawn
//!
//! Per notification (one loop per class):
//!     NotificationStream::recv → writer gate
//!     → RecordStore::query_by_id → Decoder
//!     → ConfigCache::upsert / remove → ConfigCache::publish
//!
//! Reconnect:
//!     stream error → backoff → resubscribe → resync
//! ```

pub mod bridge;

pub use bridge::{ListenerStatus, NotificationBridge, ResyncSummary, SyncError};
