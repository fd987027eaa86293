//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: SITE_DOMAIN, PORT, POSTGRES_*)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; tenant changes arrive through the store
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, RelayConfig, StoreBackend, StoreConfig, SyncConfig,
};
pub use validation::ValidationError;
