//! Webhook relay (v1)
//!
//! Multi-tenant webhook relay built with Tokio, Axum and PostgreSQL.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                      WEBHOOK RELAY                        │
//!                 │                                                           │
//!   PostgreSQL    │  ┌──────────┐    ┌──────────┐    ┌──────────────┐         │
//!   NOTIFY  ──────┼─▶│  store   │───▶│   sync   │───▶│    cache     │         │
//!   (id only)     │  │ listener │    │  bridge  │    │ (id → config)│         │
//!                 │  └──────────┘    └──────────┘    └──────┬───────┘         │
//!                 │                                         │ events          │
//!                 │                                         ▼                 │
//!   Client        │  ┌──────────┐    ┌──────────┐    ┌──────────────┐         │
//!   /webhook ─────┼─▶│   http   │───▶│ authorize│───▶│   dispatch   │         │
//!   /poll         │  │  server  │    │ (secret) │    │(host → route)│         │
//!   /reply        │  └──────────┘    └──────────┘    └──────────────┘         │
//!                 │                                                           │
//!                 │   config · observability · resilience · lifecycle         │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use webhook_relay::config::load_config;
use webhook_relay::dispatch::TryLaterBuilder;
use webhook_relay::lifecycle::{shutdown_signal, startup::open_store, Relay};
use webhook_relay::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "webhook-relay", version, about = "Multi-tenant webhook relay")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);

    if cli.check_config {
        tracing::info!(site_domain = %config.site_domain, "Configuration is valid");
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        site_domain = %config.site_domain,
        bind_address = %config.listener.bind_address,
        backend = ?config.store.backend,
        "webhook-relay starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = open_store(&config.store).await?;
    let relay = Relay::start(&config, store, Arc::new(TryLaterBuilder)).await?;

    tracing::info!(address = %relay.local_addr()?, "Listening for connections");
    relay.run_until(shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
