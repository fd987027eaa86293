//! Request inspection.
//!
//! # Responsibilities
//! - Generate a request ID for every inbound request
//! - Derive the tenant hostname a request is addressed to
//!
//! # Design Decisions
//! - An inbound `x-request-id` is kept; one is generated only when absent
//! - The `Host` header wins over the URI authority (HTTP/1.1 vs HTTP/2)

use axum::http::{header, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

/// Header carrying the request ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// UUID v4 request ID generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayRequestId;

impl MakeRequestId for RelayRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).ok()?))
    }
}

/// Layers that set a missing request ID and echo it on the response.
pub fn request_id_layers() -> (SetRequestIdLayer<RelayRequestId>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::new(X_REQUEST_ID.clone(), RelayRequestId),
        PropagateRequestIdLayer::new(X_REQUEST_ID.clone()),
    )
}

/// Request ID of a request, or `"unknown"` before the layer ran.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Hostname the request is addressed to, lower-cased and without port.
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    let raw = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))?;
    normalize_host(raw)
}

fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    // Drop any userinfo carried by an absolute-form authority.
    let raw = raw.rsplit('@').next().unwrap_or(raw);

    let host = match raw.strip_prefix('[') {
        Some(rest) => &raw[..rest.find(']')? + 2],
        None => raw.split(':').next().unwrap_or(raw),
    };

    let host = host.trim_end_matches('.');
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}
