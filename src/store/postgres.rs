//! PostgreSQL store adapter.
//!
//! Expects a `webhooks (id, blob)` table and triggers issuing
//! `NOTIFY added|updated|removed, '<id>'`. `id` may be any type with a text
//! cast; `blob` may be `BYTEA`, `TEXT`/`VARCHAR`, `JSON` or `JSONB`.
//!
//! A dropped LISTEN connection is reported as `StoreError::Disconnected`
//! instead of being re-established silently, since notifications sent while
//! it was down are gone and the caller has to reconcile.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgListener, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::StoreConfig;
use crate::store::{ChangeKind, Notification, NotificationStream, PersistedRecord, RecordStore, StoreError};

const SELECT_ALL: &str = "SELECT id::text AS id, blob FROM webhooks";
const SELECT_BY_ID: &str = "SELECT id::text AS id, blob FROM webhooks WHERE id::text = $1";

/// Record store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool using the store configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(connect_options(config)?)
            .await?;

        tracing::info!(
            host = %config.host,
            database = %config.dbname,
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Connection options from `store.url`, or from the individual fields.
fn connect_options(config: &StoreConfig) -> Result<PgConnectOptions, StoreError> {
    match &config.url {
        Some(url) => Ok(url.parse::<PgConnectOptions>()?),
        None => Ok(PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname)),
    }
}

fn record_from_row(row: &PgRow) -> Result<PersistedRecord, StoreError> {
    let id: String = row.try_get("id").map_err(|e| StoreError::Row {
        column: "id",
        reason: e.to_string(),
    })?;
    Ok(PersistedRecord { id, blob: blob_from_row(row)? })
}

/// Raw blob bytes, whatever the column type.
fn blob_from_row(row: &PgRow) -> Result<Vec<u8>, StoreError> {
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>("blob") {
        return Ok(bytes);
    }
    if let Ok(text) = row.try_get::<String, _>("blob") {
        return Ok(text.into_bytes());
    }
    row.try_get::<serde_json::Value, _>("blob")
        .map(|value| value.to_string().into_bytes())
        .map_err(|e| StoreError::Row {
            column: "blob",
            reason: e.to_string(),
        })
}

/// Map one `try_recv` result; `None` means the connection was lost.
fn into_notification(kind: ChangeKind, payload: Option<&str>) -> Result<Notification, StoreError> {
    match payload {
        Some(id) => Ok(Notification::new(kind, id)),
        None => Err(StoreError::Disconnected(kind)),
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn query_all(&self) -> Result<Vec<PersistedRecord>, StoreError> {
        let rows = sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn query_by_id(&self, id: &str) -> Result<Option<PersistedRecord>, StoreError> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn subscribe(&self, kind: ChangeKind) -> Result<Box<dyn NotificationStream>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(kind.channel()).await?;
        tracing::debug!(channel = %kind, "LISTEN established");
        Ok(Box::new(PgNotificationStream { kind, listener }))
    }
}

struct PgNotificationStream {
    kind: ChangeKind,
    listener: PgListener,
}

#[async_trait]
impl NotificationStream for PgNotificationStream {
    async fn recv(&mut self) -> Result<Notification, StoreError> {
        let notification = self.listener.try_recv().await?;
        into_notification(self.kind, notification.as_ref().map(|n| n.payload()))
    }
}
