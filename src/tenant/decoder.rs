//! Persisted record decoding.
//!
//! # Responsibilities
//! - Deserialize the JSON blob of a persisted row
//! - Derive the hostname from subdomain + site domain
//! - Compile typed filter records into single-host networks
//! - Attach deployment operational parameters
//!
//! # Design Decisions
//! - Pure transform: no I/O, diagnostics only through `tracing`
//! - One filter compiler parametrised by kind, so both lists parse identically
//! - Unparseable filters are skipped; the record itself still decodes

use std::net::IpAddr;

use ipnet::IpNet;
use serde::Deserialize;
use thiserror::Error;

use crate::store::PersistedRecord;
use crate::tenant::model::{Configuration, FilterKind, OperationalParams};

/// Error type for record decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The blob is not a valid tenant document.
    #[error("malformed blob for record {id}: {source}")]
    Blob {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The record has no subdomain, so no hostname can be derived.
    #[error("record {id} has no subdomain")]
    MissingSubdomain { id: String },
}

/// Intermediate shape of the persisted blob.
///
/// Accepts the camelCase, lowercase and PascalCase spellings older writers
/// produced. Missing fields take zero values.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredTenant {
    #[serde(alias = "Name")]
    name: String,

    #[serde(alias = "Subdomain")]
    subdomain: String,

    #[serde(alias = "Secret")]
    secret: String,

    #[serde(alias = "autoReply", alias = "AutoReply")]
    autoreply: bool,

    #[serde(
        rename = "filteringEnabled",
        alias = "filteringenabled",
        alias = "FilteringEnabled"
    )]
    filtering_enabled: bool,

    #[serde(alias = "Filters")]
    filters: Option<Vec<StoredFilter>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredFilter {
    #[serde(alias = "Id")]
    id: String,

    #[serde(alias = "Description")]
    #[allow(dead_code)]
    description: String,

    #[serde(rename = "type", alias = "Type")]
    kind: Option<String>,

    #[serde(alias = "IP", alias = "Ip")]
    ip: String,
}

/// Turns persisted records into Configurations.
#[derive(Debug, Clone)]
pub struct Decoder {
    site_domain: String,
    params: OperationalParams,
}

impl Decoder {
    /// Create a decoder for the given site domain suffix.
    pub fn new(site_domain: impl Into<String>, params: OperationalParams) -> Self {
        let site_domain = site_domain
            .into()
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();

        Self {
            site_domain,
            params,
        }
    }

    /// The normalized site domain suffix.
    pub fn site_domain(&self) -> &str {
        &self.site_domain
    }

    /// Decode one persisted record.
    pub fn decode(&self, record: &PersistedRecord) -> Result<Configuration, DecodeError> {
        let stored: StoredTenant =
            serde_json::from_slice(&record.blob).map_err(|source| DecodeError::Blob {
                id: record.id.clone(),
                source,
            })?;

        let subdomain = stored.subdomain.trim();
        if subdomain.is_empty() {
            return Err(DecodeError::MissingSubdomain {
                id: record.id.clone(),
            });
        }

        if stored.secret.is_empty() {
            tracing::warn!(tenant_id = %record.id, "Tenant has an empty secret and will be unreachable");
        }

        let filters = stored.filters.unwrap_or_default();
        let webhook_filters = compile_filters(&record.id, &filters, FilterKind::Webhook);
        let poll_reply_filters = compile_filters(&record.id, &filters, FilterKind::PollReply);

        Ok(Configuration {
            id: record.id.clone(),
            name: stored.name,
            hostname: format!("{}.{}", subdomain, self.site_domain).to_ascii_lowercase(),
            secret: stored.secret,
            filtering_enabled: stored.filtering_enabled,
            auto_reply: stored.autoreply,
            webhook_filters,
            poll_reply_filters,
            params: self.params.clone(),
        })
    }
}

/// Compile the filters of one kind into single-host networks.
///
/// Untyped filters apply to every kind. Unknown kinds and unparseable
/// addresses are dropped with a warning naming the owning record.
fn compile_filters(id: &str, filters: &[StoredFilter], kind: FilterKind) -> Vec<IpNet> {
    let mut networks = Vec::new();

    for filter in filters {
        match filter.kind.as_deref() {
            None => {}
            Some(raw) => match FilterKind::parse(raw) {
                Some(k) if k == kind => {}
                Some(_) => continue,
                None => {
                    // Reported once, on the first pass.
                    if kind == FilterKind::Webhook {
                        tracing::warn!(tenant_id = %id, filter_id = %filter.id, filter_type = %raw, "Skipping filter with unknown type");
                    }
                    continue;
                }
            },
        }

        match host_network(&filter.ip) {
            Some(net) => networks.push(net),
            None => {
                tracing::warn!(
                    tenant_id = %id,
                    filter_id = %filter.id,
                    ip = %filter.ip,
                    kind = %kind,
                    "Skipping unparseable filter"
                );
            }
        }
    }

    networks
}

/// Parse a single address as a host network (/32 or /128).
fn host_network(raw: &str) -> Option<IpNet> {
    let addr: IpAddr = raw.trim().parse().ok()?;
    let prefix = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(addr, prefix).ok()
}
