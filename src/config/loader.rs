//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
///
/// Without a path, defaults plus environment are used.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => RelayConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply the deployment environment variables on top of file values.
///
/// Recognised: `SITE_DOMAIN`, `PORT`, `DATABASE_URL`, `POSTGRES_HOST`,
/// `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`, `POSTGRES_DBNAME`.
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(domain) = get("SITE_DOMAIN") {
        config.site_domain = domain;
    }

    if let Some(port) = get("PORT") {
        let port: u16 = port.trim().parse().map_err(|e| ConfigError::Env {
            name: "PORT",
            reason: format!("{}", e),
        })?;
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }

    if let Some(url) = get("DATABASE_URL") {
        config.store.url = Some(url);
    }
    if let Some(host) = get("POSTGRES_HOST") {
        config.store.host = host;
    }
    if let Some(port) = get("POSTGRES_PORT") {
        config.store.port = port.trim().parse().map_err(|e| ConfigError::Env {
            name: "POSTGRES_PORT",
            reason: format!("{}", e),
        })?;
    }
    if let Some(user) = get("POSTGRES_USER") {
        config.store.user = user;
    }
    if let Some(password) = get("POSTGRES_PASSWORD") {
        config.store.password = password;
    }
    if let Some(dbname) = get("POSTGRES_DBNAME") {
        config.store.dbname = dbname;
    }

    Ok(())
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind_address: &str, port: u16) -> String {
    let host = match bind_address.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        _ => "0.0.0.0",
    };
    format!("{}:{}", host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use crate::config::schema::StoreBackend;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_minimal_file() {
        let config = parse_config(
            r#"
            site_domain = "webhookproxy.com"

            [store]
            backend = "memory"

            [tenant_defaults]
            back_queue_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.site_domain, "webhookproxy.com");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.tenant_defaults.back_queue_size, 10);
        assert_eq!(config.tenant_defaults.try_later_status, 503);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RelayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("SITE_DOMAIN", "example.com"),
                ("PORT", "9000"),
                ("POSTGRES_USER", "relay"),
                ("POSTGRES_PASSWORD", "pw"),
                ("POSTGRES_DBNAME", "relaydb"),
                ("POSTGRES_HOST", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.site_domain, "example.com");
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
        assert_eq!(config.store.user, "relay");
        assert_eq!(config.store.dbname, "relaydb");
        assert_eq!(config.store.host, "localhost");
    }

    #[test]
    fn test_bad_port_is_rejected() {
        let mut config = RelayConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "site_domain = \"example.com\"\n[store]\nbackend = \"memory\"\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_with_port() {
        assert_eq!(with_port("127.0.0.1:8080", 9000), "127.0.0.1:9000");
        assert_eq!(with_port("[::]:8080", 81), "[::]:81");
        assert_eq!(with_port("bogus", 81), "0.0.0.0:81");
    }
}
