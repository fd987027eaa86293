//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store query:
//!     → timeouts.rs (bounded deadline)
//!
//! Listener failure:
//!     → backoff.rs (jittered exponential delay before resubscribing)
//! ```
//!
//! # Design Decisions
//! - Background failures are retried, never fatal to the serving process
//! - Backoff is capped so a recovered store is picked up quickly

pub mod backoff;
pub mod timeouts;
