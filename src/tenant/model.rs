//! Tenant configuration types.

use std::fmt;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Routing, authorization and filter policy for one tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Stable primary key of the persisted record.
    pub id: String,

    /// Display name (informational only).
    pub name: String,

    /// Fully-qualified, lower-cased hostname the tenant is reachable on.
    pub hostname: String,

    /// Shared secret expected as the last path segment.
    pub secret: String,

    /// Gate for IP allow-listing in the tenant handler.
    pub filtering_enabled: bool,

    /// Automatic response toggle for the tenant handler.
    pub auto_reply: bool,

    /// Networks allowed to post webhooks.
    pub webhook_filters: Vec<IpNet>,

    /// Networks allowed to poll and reply.
    pub poll_reply_filters: Vec<IpNet>,

    /// Operational parameters attached at decode time.
    pub params: OperationalParams,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("secret", &"<redacted>")
            .field("filtering_enabled", &self.filtering_enabled)
            .field("auto_reply", &self.auto_reply)
            .field("webhook_filters", &self.webhook_filters)
            .field("poll_reply_filters", &self.poll_reply_filters)
            .field("params", &self.params)
            .finish()
    }
}

/// Operational parameters consumed by the tenant handler.
///
/// Not persisted per tenant; every Configuration carries the deployment
/// defaults from the `[tenant_defaults]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationalParams {
    /// Status returned when the back-queue is full.
    pub try_later_status: u16,

    /// Capacity of the pending webhook queue.
    pub back_queue_size: usize,

    /// Maximum time a webhook waits for a reply, in seconds.
    pub max_wait_secs: u64,

    /// Long-poll hold time, in seconds.
    pub long_poll_wait_secs: u64,

    /// Enable long polling.
    pub use_long_poll: bool,

    /// Maximum accepted payload, in bytes.
    pub max_payload_size: usize,

    /// Include debug details in handler responses.
    pub show_debug_info: bool,
}

impl OperationalParams {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn long_poll_wait(&self) -> Duration {
        Duration::from_secs(self.long_poll_wait_secs)
    }
}

impl Default for OperationalParams {
    fn default() -> Self {
        Self {
            try_later_status: 503,
            back_queue_size: 100,
            max_wait_secs: 30,
            long_poll_wait_secs: 30,
            use_long_poll: true,
            max_payload_size: 5_000_000,
            show_debug_info: true,
        }
    }
}

/// Which traffic a filter record applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Webhook,
    PollReply,
}

impl FilterKind {
    /// Discriminator value used in persisted filter records.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Webhook => "webhook",
            FilterKind::PollReply => "pollreply",
        }
    }

    /// Parse a persisted discriminator (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("webhook") {
            Some(FilterKind::Webhook)
        } else if value.eq_ignore_ascii_case("pollreply") {
            Some(FilterKind::PollReply)
        } else {
            None
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
