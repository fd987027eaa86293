//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configured record store
//! - Subscribe to notifications, then load the cache
//! - Seed the dispatch table and attach it to the cache
//! - Start the listener loops and bind the HTTP listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subscriptions open before the load so no change falls in between
//! - The table subscribes to the cache only after seeding, and before any
//!   listener runs

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::cache::{ConfigCache, LoadError};
use crate::config::{RelayConfig, StoreBackend, StoreConfig};
use crate::dispatch::{DispatchTable, HandlerBuilder};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::store::{MemoryStore, PostgresStore, RecordStore, StoreError};
use crate::sync::NotificationBridge;
use crate::tenant::Decoder;

/// How long stopped listener tasks get to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for relay startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to read seed file {path}: {source}")]
    Seed { path: String, source: std::io::Error },

    #[error("initial load failed: {0}")]
    Load(#[from] LoadError),

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: std::io::Error },
}

/// Open the store selected by `store.backend`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StartupError> {
    match config.backend {
        StoreBackend::Postgres => Ok(Arc::new(PostgresStore::connect(config).await?)),
        StoreBackend::Memory => {
            let store = match &config.seed_path {
                Some(path) => MemoryStore::from_seed_file(Path::new(path)).map_err(|source| StartupError::Seed {
                    path: path.clone(),
                    source,
                })?,
                None => MemoryStore::new(),
            };
            tracing::info!(rows = store.len(), "Using in-memory store");
            Ok(Arc::new(store))
        }
    }
}

/// A fully started relay, ready to serve.
pub struct Relay {
    cache: Arc<ConfigCache>,
    table: Arc<DispatchTable>,
    bridge: Arc<NotificationBridge>,
    server: HttpServer,
    listener: TcpListener,
    tasks: Vec<JoinHandle<()>>,
    shutdown: Shutdown,
}

impl Relay {
    /// Bring every subsystem up in order.
    pub async fn start(
        config: &RelayConfig,
        store: Arc<dyn RecordStore>,
        builder: Arc<dyn HandlerBuilder>,
    ) -> Result<Self, StartupError> {
        let query_timeout = Duration::from_secs(config.store.query_timeout_secs);
        let decoder = Decoder::new(config.site_domain.as_str(), config.tenant_defaults.clone());
        let cache = Arc::new(ConfigCache::new());

        let bridge = Arc::new(NotificationBridge::new(
            store.clone(),
            cache.clone(),
            decoder.clone(),
            config.sync.clone(),
            query_timeout,
        ));
        let streams = bridge.subscribe_all().await;

        let loaded = match tokio::time::timeout(query_timeout, cache.load(store.as_ref(), &decoder)).await {
            Ok(result) => result?,
            Err(_) => return Err(LoadError::Store(StoreError::Timeout(query_timeout)).into()),
        };

        let table = Arc::new(DispatchTable::new(builder));
        let routes = table.seed(&cache);
        cache.subscribe(table.clone());
        tracing::info!(
            site_domain = %decoder.site_domain(),
            tenants = loaded,
            routes,
            "Dispatch table seeded"
        );

        let shutdown = Shutdown::new();
        let tasks = bridge.spawn(streams, &shutdown);

        let listener = TcpListener::bind(&config.listener.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                address: config.listener.bind_address.clone(),
                source,
            })?;

        let state = AppState {
            table: table.clone(),
            cache: cache.clone(),
            listeners: bridge.status(),
        };
        let server = HttpServer::new(&config.listener, state);

        Ok(Self {
            cache,
            table,
            bridge,
            server,
            listener,
            tasks,
            shutdown,
        })
    }

    /// Address the HTTP listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    pub fn bridge(&self) -> &Arc<NotificationBridge> {
        &self.bridge
    }

    /// Serve until `signal` completes, then stop the listener loops.
    pub async fn run_until<F>(self, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Relay {
            server,
            listener,
            tasks,
            shutdown,
            ..
        } = self;

        let served = server.run(listener, signal).await;

        shutdown.drain(tasks, DRAIN_TIMEOUT).await;

        served
    }
}
