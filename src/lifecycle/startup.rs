//! Startup orchestration.
//!
//! # Responsibilities
//! - Load templates and the initial routing table
//! - Initialize subsystems in dependency order
//! - Start background tasks (store watcher, signals, metrics)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener starts last (traffic only once a table is published)

use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::{ConfigError, ConfigWatcher, GatewayConfig};
use crate::error::GatewayError;
use crate::http::GatewayServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::routing::Reloader;
use crate::store::FileStore;
use crate::templates::{TemplateLoadError, TemplateStore};

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Templates(#[from] TemplateLoadError),

    #[error("initial routing table: {0}")]
    Routing(#[from] GatewayError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch store file: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the gateway until a shutdown signal arrives.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr)?;
        }
    }

    let templates = Arc::new(TemplateStore::load_dir(&config.templates.directory)?);
    let store = Arc::new(FileStore::new(&config.store.path));
    let reloader = Arc::new(Reloader::new(store, templates));

    let report = reloader.reload()?;
    tracing::info!(
        store = %config.store.path.display(),
        generation = report.generation,
        routes = report.routes,
        "Initial routing table loaded"
    );

    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();

    let _watcher = if config.store.watch {
        Some(ConfigWatcher::new(&config.store.path, reload_tx.clone()).run()?)
    } else {
        None
    };
    signals::spawn_signal_handler(shutdown.clone(), reload_tx);

    let address = config.listener.bind_address.clone();
    let server = GatewayServer::new(config, reloader)?;
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    server.run(listener, reload_rx, shutdown).await.map_err(StartupError::Serve)
}
