//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check backend-specific requirements (database credentials)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{RelayConfig, StoreBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("site_domain must be set (SITE_DOMAIN)")]
    MissingSiteDomain,

    #[error("site_domain {0:?} is not a valid domain suffix")]
    InvalidSiteDomain(String),

    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("store.{0} must be set for the postgres backend")]
    MissingStoreField(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("sync.base_backoff_ms must not exceed sync.max_backoff_ms")]
    BackoffOrder,

    #[error("listener.request_timeout_secs must exceed tenant_defaults.long_poll_wait_secs")]
    TimeoutBelowLongPoll,
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let domain = config.site_domain.trim();
    if domain.is_empty() {
        errors.push(ValidationError::MissingSiteDomain);
    } else if domain.contains(['/', ':', ' ']) || domain.ends_with('.') {
        errors.push(ValidationError::InvalidSiteDomain(config.site_domain.clone()));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.store.backend == StoreBackend::Postgres && config.store.url.is_none() {
        if config.store.user.is_empty() {
            errors.push(ValidationError::MissingStoreField("user"));
        }
        if config.store.password.is_empty() {
            errors.push(ValidationError::MissingStoreField("password"));
        }
        if config.store.dbname.is_empty() {
            errors.push(ValidationError::MissingStoreField("dbname"));
        }
    }

    if config.store.query_timeout_secs == 0 {
        errors.push(ValidationError::Zero("store.query_timeout_secs"));
    }
    if config.store.max_connections == 0 {
        errors.push(ValidationError::Zero("store.max_connections"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }
    if config.sync.base_backoff_ms == 0 {
        errors.push(ValidationError::Zero("sync.base_backoff_ms"));
    }
    if config.sync.base_backoff_ms > config.sync.max_backoff_ms {
        errors.push(ValidationError::BackoffOrder);
    }
    if config.listener.request_timeout_secs <= config.tenant_defaults.long_poll_wait_secs {
        errors.push(ValidationError::TimeoutBelowLongPoll);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
