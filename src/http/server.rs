//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the per-tenant endpoints
//! - Wire up middleware (tracing, limits, timeout, request ID)
//! - Resolve the tenant and check the secret before dispatching
//! - Report relay health
//! - Serve until the shutdown future completes

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::ConfigCache;
use crate::config::ListenerConfig;
use crate::dispatch::{Action, DispatchTable, RouteError};
use crate::http::request::{request_host, request_id, request_id_layers};
use crate::observability::metrics;
use crate::sync::ListenerStatus;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<DispatchTable>,
    pub cache: Arc<ConfigCache>,
    pub listeners: Arc<ListenerStatus>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ListenerConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        let mut router = Router::new().route("/healthz", get(health_handler));

        for action in Action::ALL {
            router = router
                .route(
                    &format!("/{}/{{secret}}", action),
                    any(move |State(state): State<AppState>, Path(secret): Path<String>, request: Request<Body>| {
                        tenant_request(state, action, secret, request)
                    }),
                )
                .route(
                    &format!("/{}", action),
                    any(move |State(state): State<AppState>, request: Request<Body>| {
                        tenant_request(state, action, String::new(), request)
                    }),
                )
                .route(
                    &format!("/{}/", action),
                    any(move |State(state): State<AppState>, request: Request<Body>| {
                        tenant_request(state, action, String::new(), request)
                    }),
                );
        }

        let (set_request_id, propagate_request_id) = request_id_layers();

        router
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(propagate_request_id)
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id)
    }

    /// The configured router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` completes, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve the tenant for one request and hand it to the tenant's handlers.
async fn tenant_request(state: AppState, action: Action, secret: String, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request).to_string();

    let outcome = match request_host(&request) {
        Some(hostname) => state
            .table
            .authorize(&hostname, action, &secret)
            .map(|route| (hostname, route)),
        None => Err(RouteError::MissingHost),
    };

    let response = match outcome {
        Ok((hostname, route)) => {
            tracing::debug!(
                request_id = %request_id,
                hostname = %hostname,
                tenant_id = %route.config.id,
                action = %action,
                "Dispatching request"
            );
            route.handlers.handle(action, request).await
        }
        Err(e) => {
            tracing::debug!(request_id = %request_id, action = %action, error = %e, "Request rejected");
            e.into_response()
        }
    };

    metrics::record_request(action.as_str(), response.status().as_u16(), start);
    response
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    tenants: usize,
    hostnames: usize,
    degraded: Vec<&'static str>,
}

/// Liveness plus sync state. Degraded listeners mean the cache may be stale,
/// but the relay keeps serving, so the status code stays 200.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let degraded: Vec<&'static str> = state
        .listeners
        .degraded()
        .into_iter()
        .map(|kind| kind.channel())
        .collect();

    let report = HealthReport {
        status: if degraded.is_empty() { "ok" } else { "degraded" },
        tenants: state.cache.len(),
        hostnames: state.table.len(),
        degraded,
    };
    (StatusCode::OK, Json(report))
}
