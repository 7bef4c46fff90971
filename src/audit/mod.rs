//! Per-route audit logging.
//!
//! # Responsibilities
//! - Lazily create one rotating sink per route identifier
//! - Hand the same sink to every request on that route
//!
//! # Design Decisions
//! - Registry is a `DashMap`; the entry API makes concurrent first calls
//!   for one id create exactly one sink
//! - Sinks live for the life of the process (route ids are stable)
//! - A sink that cannot be opened degrades to a disabled logger; requests
//!   are never failed for audit reasons

pub mod sink;

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::AuditConfig;

pub use sink::{AuditLogger, AuditRecord, PendingAudit};

/// Cache of audit sinks keyed by route id.
#[derive(Debug)]
pub struct AuditRegistry {
    config: AuditConfig,
    loggers: DashMap<String, Arc<AuditLogger>>,
}

impl AuditRegistry {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            loggers: DashMap::new(),
        }
    }

    /// Sink for `route_id`, created on first use.
    pub fn logger(&self, route_id: &str) -> Arc<AuditLogger> {
        if let Some(existing) = self.loggers.get(route_id) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .loggers
            .entry(route_id.to_string())
            .or_insert_with(|| Arc::new(self.open(route_id)));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }

    fn open(&self, route_id: &str) -> AuditLogger {
        if !self.config.enabled {
            return AuditLogger::disabled(route_id);
        }

        match AuditLogger::open(route_id, &self.config) {
            Ok(logger) => {
                tracing::debug!(proxy_id = %route_id, "Audit log opened");
                logger
            }
            Err(e) => {
                tracing::error!(
                    proxy_id = %route_id,
                    directory = %self.config.directory.display(),
                    error = %e,
                    "Failed to open audit log, requests on this route will not be audited"
                );
                AuditLogger::disabled(route_id)
            }
        }
    }
}
