//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the admin API and the proxy catch-all
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and drain on shutdown
//! - Run reload triggers (store watcher, SIGHUP) against the reloader

use axum::{body::Body, routing::any, Router};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::audit::AuditRegistry;
use crate::config::{ConfigError, GatewayConfig};
use crate::http::credentials::CredentialPolicy;
use crate::http::dispatch::proxy_handler;
use crate::lifecycle::Shutdown;
use crate::routing::{ReloadTrigger, Reloader};

/// Pooled client for the upstream leg, `http` and `https` service URLs.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub reloader: Arc<Reloader>,
    pub audit: Arc<AuditRegistry>,
    pub credentials: Arc<CredentialPolicy>,
    pub client: UpstreamClient,
}

impl AppState {
    pub fn new(config: GatewayConfig, reloader: Arc<Reloader>) -> Result<Self, ConfigError> {
        let credentials =
            CredentialPolicy::from_config(&config.proxy).map_err(|e| ConfigError::Validation(vec![e]))?;

        let client = upstream_client(Duration::from_secs(config.timeouts.connect_secs))?;

        Ok(Self {
            audit: Arc::new(AuditRegistry::new(config.audit.clone())),
            config: Arc::new(config),
            reloader,
            credentials: Arc::new(credentials),
            client,
        })
    }
}

/// Build the upstream client. TLS uses the process crypto provider if one
/// is installed, aws-lc-rs otherwise, with the webpki root set.
pub fn upstream_client(connect_timeout: Duration) -> Result<UpstreamClient, rustls::Error> {
    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(connect_timeout));
    http.enforce_http(false);

    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
    let connector = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(provider)?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Create a new server. The reloader should already hold a table.
    pub fn new(config: GatewayConfig, reloader: Arc<Reloader>) -> Result<Self, ConfigError> {
        let state = AppState::new(config, reloader)?;
        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler));

        if state.config.admin.enabled {
            router = router.merge(admin::router(state.clone()));
        }

        let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);
        router
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` fires, applying reload triggers.
    pub async fn run(
        self,
        listener: TcpListener,
        reload_rx: mpsc::UnboundedReceiver<ReloadTrigger>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(run_reloads(Arc::clone(&self.state.reloader), reload_rx, shutdown.clone()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Apply reload triggers until the channel closes or shutdown fires.
///
/// Triggers queued behind a running rebuild are coalesced into one; a manual
/// trigger in the batch upgrades it to a full reload.
async fn run_reloads(
    reloader: Arc<Reloader>,
    mut reload_rx: mpsc::UnboundedReceiver<ReloadTrigger>,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();

    loop {
        let mut trigger = tokio::select! {
            trigger = reload_rx.recv() => match trigger {
                Some(trigger) => trigger,
                None => break,
            },
            _ = stop.recv() => break,
        };
        while let Ok(queued) = reload_rx.try_recv() {
            if queued == ReloadTrigger::Manual {
                trigger = ReloadTrigger::Manual;
            }
        }

        let reloader = Arc::clone(&reloader);
        let result = tokio::task::spawn_blocking(move || match trigger {
            ReloadTrigger::StoreChanged => reloader.reload(),
            ReloadTrigger::Manual => reloader.reload_all(),
        })
        .await;

        match result {
            Ok(Ok(report)) => tracing::info!(
                trigger = ?trigger,
                generation = report.generation,
                routes = report.routes,
                published = report.published,
                "Reload complete"
            ),
            Ok(Err(e)) => tracing::error!(trigger = ?trigger, error = %e, "Reload failed"),
            Err(e) => tracing::error!(trigger = ?trigger, error = %e, "Reload task panicked"),
        }
    }

    tracing::debug!("Reload loop stopped");
}
