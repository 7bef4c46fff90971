//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT forces exit without draining
//! - SIGHUP triggers a full reload (templates + routes), not shutdown

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::routing::ReloadTrigger;

/// Internal event a signal maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalEvent {
    Terminate,
    Reload,
}

/// Spawn the signal loop.
pub fn spawn_signal_handler(shutdown: Shutdown, reload_tx: mpsc::UnboundedSender<ReloadTrigger>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut signals = SignalSource::new();
        let mut terminating = false;

        loop {
            match signals.next().await {
                SignalEvent::Reload => {
                    tracing::info!("SIGHUP received, reloading templates and routes");
                    if reload_tx.send(ReloadTrigger::Manual).is_err() {
                        tracing::warn!("Reload channel closed, ignoring SIGHUP");
                    }
                }
                SignalEvent::Terminate if terminating => {
                    tracing::warn!("Second shutdown signal received, exiting immediately");
                    std::process::exit(1);
                }
                SignalEvent::Terminate => {
                    tracing::info!("Shutdown signal received");
                    terminating = true;
                    shutdown.trigger();
                }
            }
        }
    })
}

#[cfg(unix)]
struct SignalSource {
    unix: Option<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)>,
}

#[cfg(unix)]
impl SignalSource {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(term), Ok(hup)) => Self { unix: Some((term, hup)) },
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, only Ctrl+C is handled");
                Self { unix: None }
            }
        }
    }

    async fn next(&mut self) -> SignalEvent {
        let Some((term, hup)) = self.unix.as_mut() else {
            let _ = tokio::signal::ctrl_c().await;
            return SignalEvent::Terminate;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => SignalEvent::Terminate,
            _ = term.recv() => SignalEvent::Terminate,
            _ = hup.recv() => SignalEvent::Reload,
        }
    }
}

#[cfg(not(unix))]
struct SignalSource;

#[cfg(not(unix))]
impl SignalSource {
    fn new() -> Self {
        Self
    }

    async fn next(&mut self) -> SignalEvent {
        let _ = tokio::signal::ctrl_c().await;
        SignalEvent::Terminate
    }
}
