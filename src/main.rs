//! arr-gateway
//!
//! Credential-translating API gateway for *arr services.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                 ARR GATEWAY                  │
//!   Client request      │  ┌────────┐   ┌──────────┐   ┌────────────┐  │
//!   ────────────────────┼─▶│  http  │──▶│ dispatch │──▶│  routing   │  │
//!   (X-Api-Key/apikey)  │  │ server │   │          │   │   table    │  │
//!                       │  └────────┘   └────┬─────┘   └─────▲──────┘  │
//!                       │                    │               │ swap    │
//!   Client response     │                    ▼               │         │
//!   ◀───────────────────┼──────────── upstream call    ┌─────┴──────┐  │
//!                       │              + audit sink    │  reloader  │  │
//!                       │                    │         └─────▲──────┘  │
//!                       │                    │               │         │
//!                       │                    │      store file / SIGHUP│
//!                       │                    │      / admin reload     │
//!                       └────────────────────┼─────────────────────────┘
//!                                            ▼
//!                                  Sonarr / Radarr / Lidarr / Prowlarr
//! ```

use clap::Parser;
use std::path::PathBuf;

use arr_gateway::config::{load_config, GatewayConfig};
use arr_gateway::lifecycle;
use arr_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "arr-gateway", version, about = "Credential-translating API gateway for *arr services")]
struct Args {
    /// Path to the gateway configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "ARR_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "arr-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        store = %config.store.path.display(),
        templates = %config.templates.directory.display(),
        request_timeout_secs = config.timeouts.request_secs,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
