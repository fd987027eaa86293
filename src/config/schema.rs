//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::tenant::OperationalParams;

/// Root configuration for the webhook relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Deployment-wide domain suffix; tenants live on `<subdomain>.<site_domain>`.
    pub site_domain: String,

    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Durable store connection.
    pub store: StoreConfig,

    /// Notification listener behaviour.
    pub sync: SyncConfig,

    /// Operational parameters attached to every tenant.
    pub tenant_defaults: OperationalParams,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds. Must exceed the long-poll wait.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 60,
            max_body_bytes: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Which record store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store implementation.
    pub backend: StoreBackend,

    /// Full connection URL; overrides the individual fields when set.
    pub url: Option<String>,

    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,

    /// Pool size.
    pub max_connections: u32,

    /// Connection acquire timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for a single query in seconds.
    pub query_timeout_secs: u64,

    /// JSON seed file for the memory backend.
    pub seed_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            dbname: String::new(),
            max_connections: 5,
            connect_timeout_secs: 10,
            query_timeout_secs: 5,
            seed_path: None,
        }
    }
}

/// Notification listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base delay for resubscribe backoff in milliseconds.
    pub base_backoff_ms: u64,

    /// Maximum resubscribe delay in milliseconds.
    pub max_backoff_ms: u64,

    /// Reconcile the whole cache after a listener reconnects.
    pub resync_on_reconnect: bool,

    /// Periodic full reconcile interval in seconds (0 = disabled).
    pub resync_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            resync_on_reconnect: true,
            resync_interval_secs: 0,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
