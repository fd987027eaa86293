//! HTTP surface of the relay.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, middleware stack)
//!     → request.rs (request ID, host extraction)
//!     → DispatchTable::authorize(host, action, secret)
//!     → TenantHandlers::{hook, poll, reply}
//!     → response.rs (route errors to status codes)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_host, RelayRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
