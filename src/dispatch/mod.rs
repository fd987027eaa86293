//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ConfigCache::for_all → DispatchTable::seed → HandlerBuilder::build
//!
//! Cache events (DispatchTable is a CacheObserver):
//!     Added   → insert hostname
//!     Changed → evict old hostname on rename, insert new
//!     Removed → evict hostname
//!
//! Per request:
//!     (host, action, secret) → DispatchTable::authorize
//!     → TenantHandlers::{hook, poll, reply}
//! ```

pub mod handler;
pub mod table;

pub use handler::{Action, HandlerBuilder, TenantHandlers, TryLaterBuilder};
pub use table::{DispatchTable, RouteError, TenantRoute};
