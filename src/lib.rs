//! Control plane of a multi-tenant webhook relay.

// Tenant state
pub mod cache;
pub mod store;
pub mod sync;
pub mod tenant;

// Request surface
pub mod dispatch;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use cache::ConfigCache;
pub use config::schema::RelayConfig;
pub use dispatch::DispatchTable;
pub use http::HttpServer;
pub use lifecycle::{Relay, Shutdown};
