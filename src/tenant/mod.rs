//! Tenant configuration subsystem.
//!
//! # Data Flow
//! ```text
//! persisted row (id, blob)
//!     → decoder.rs (deserialize blob, derive hostname, compile filters)
//!     → Configuration (validated, immutable, shared via Arc)
//!     → cache / dispatch table
//! ```
//!
//! # Design Decisions
//! - A Configuration is never patched; updates replace it wholesale
//! - Operational parameters are deployment defaults attached at decode time
//! - A bad filter entry is dropped, a bad blob rejects the whole row

pub mod decoder;
pub mod model;

pub use decoder::{DecodeError, Decoder};
pub use model::{Configuration, FilterKind, OperationalParams};
