//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use webhook_relay::cache::ConfigCache;
use webhook_relay::config::{RelayConfig, StoreBackend};
use webhook_relay::dispatch::{DispatchTable, HandlerBuilder, TenantHandlers};
use webhook_relay::store::MemoryStore;
use webhook_relay::tenant::Configuration;
use webhook_relay::Relay;

/// Relay configuration for tests: memory store, ephemeral port, fast backoff.
pub fn relay_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.site_domain = "example.com".into();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.store.backend = StoreBackend::Memory;
    config.store.query_timeout_secs = 2;
    config.sync.base_backoff_ms = 20;
    config.sync.max_backoff_ms = 100;
    config
}

/// A tenant blob as the store persists it.
pub fn blob(subdomain: &str, secret: &str) -> Vec<u8> {
    serde_json::json!({
        "name": subdomain,
        "subdomain": subdomain,
        "secret": secret,
        "filteringEnabled": false,
        "filters": [],
    })
    .to_string()
    .into_bytes()
}

/// Handlers answering `<action> <hostname>` so tests can see who served them.
struct EchoHandlers {
    hostname: String,
}

#[async_trait]
impl TenantHandlers for EchoHandlers {
    async fn hook(&self, _request: Request<Body>) -> Response {
        format!("webhook {}", self.hostname).into_response()
    }

    async fn poll(&self, _request: Request<Body>) -> Response {
        format!("poll {}", self.hostname).into_response()
    }

    async fn reply(&self, _request: Request<Body>) -> Response {
        format!("reply {}", self.hostname).into_response()
    }
}

pub fn echo_builder() -> Arc<dyn HandlerBuilder> {
    Arc::new(|config: &Arc<Configuration>| {
        Arc::new(EchoHandlers {
            hostname: config.hostname.clone(),
        }) as Arc<dyn TenantHandlers>
    })
}

/// A relay serving on an ephemeral port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub cache: Arc<ConfigCache>,
    pub table: Arc<DispatchTable>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestRelay {
    /// Stop the relay and wait for it to drain.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("relay did not stop")
            .expect("relay task panicked")
            .expect("relay returned an error");
    }
}

/// Start a relay over `store` with the given handler builder.
pub async fn start_relay(
    config: RelayConfig,
    store: Arc<MemoryStore>,
    builder: Arc<dyn HandlerBuilder>,
) -> TestRelay {
    let relay = Relay::start(&config, store, builder).await.expect("relay failed to start");
    let addr = relay.local_addr().unwrap();
    let cache = relay.cache().clone();
    let table = relay.table().clone();

    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(relay.run_until(async move {
        let _ = stopped.await;
    }));

    TestRelay {
        addr,
        cache,
        table,
        stop: Some(stop),
        handle,
    }
}

/// Non-pooled client so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Send `GET http://<addr><path>` addressed to `host`; returns status and body.
pub async fn get(addr: SocketAddr, host: &str, path: &str) -> (u16, String) {
    let response = client()
        .get(format!("http://{}{}", addr, path))
        .header(reqwest::header::HOST, host)
        .send()
        .await
        .expect("relay unreachable");
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..250 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
