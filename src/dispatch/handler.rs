//! Tenant handler capability.
//!
//! The handler that queues webhooks, serves long polls and relays replies
//! lives outside this crate. The dispatch table only needs a way to build one
//! per Configuration and to call its three operations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::tenant::Configuration;

/// Request actions exposed per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Webhook,
    Poll,
    Reply,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Webhook, Action::Poll, Action::Reply];

    /// Path segment and metric label for the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Webhook => "webhook",
            Action::Poll => "poll",
            Action::Reply => "reply",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook, poll and reply operations bound to one tenant.
#[async_trait]
pub trait TenantHandlers: Send + Sync {
    async fn hook(&self, request: Request<Body>) -> Response;

    async fn poll(&self, request: Request<Body>) -> Response;

    async fn reply(&self, request: Request<Body>) -> Response;

    /// Route a request to the operation matching `action`.
    async fn handle(&self, action: Action, request: Request<Body>) -> Response {
        match action {
            Action::Webhook => self.hook(request).await,
            Action::Poll => self.poll(request).await,
            Action::Reply => self.reply(request).await,
        }
    }
}

/// Builds the handler capability for a Configuration.
pub trait HandlerBuilder: Send + Sync {
    fn build(&self, config: &Arc<Configuration>) -> Arc<dyn TenantHandlers>;
}

impl<F> HandlerBuilder for F
where
    F: Fn(&Arc<Configuration>) -> Arc<dyn TenantHandlers> + Send + Sync,
{
    fn build(&self, config: &Arc<Configuration>) -> Arc<dyn TenantHandlers> {
        self(config)
    }
}

/// Builder used when no queueing handler is linked in.
///
/// Every operation answers with the tenant's try-later status, so senders
/// back off and retry instead of treating the relay as gone.
#[derive(Debug, Clone, Default)]
pub struct TryLaterBuilder;

impl HandlerBuilder for TryLaterBuilder {
    fn build(&self, config: &Arc<Configuration>) -> Arc<dyn TenantHandlers> {
        let status = StatusCode::from_u16(config.params.try_later_status)
            .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
        Arc::new(TryLaterHandlers {
            status,
            hostname: config.hostname.clone(),
        })
    }
}

struct TryLaterHandlers {
    status: StatusCode,
    hostname: String,
}

impl TryLaterHandlers {
    fn respond(&self, action: Action) -> Response {
        tracing::debug!(hostname = %self.hostname, action = %action, "No tenant handler linked; deferring");
        (self.status, "Try again later\n").into_response()
    }
}

#[async_trait]
impl TenantHandlers for TryLaterHandlers {
    async fn hook(&self, _request: Request<Body>) -> Response {
        self.respond(Action::Webhook)
    }

    async fn poll(&self, _request: Request<Body>) -> Response {
        self.respond(Action::Poll)
    }

    async fn reply(&self, _request: Request<Body>) -> Response {
        self.respond(Action::Reply)
    }
}
