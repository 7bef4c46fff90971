//! Configuration store collaborator.
//!
//! # Data Flow
//! ```text
//! store backend (TOML file / in-memory)
//!     → StoreDocument (services, apps, routes as flat records)
//!     → join() (resolve route → app + service references)
//!     → Vec<AppSnapshot> (consumed by the routing table builder)
//! ```
//!
//! # Design Decisions
//! - The core only needs "read the full current configuration"
//! - Dangling references are skipped with a warning, never fatal
//! - Mutations live on the concrete stores; reload is triggered by the caller

pub mod file;
pub mod memory;
pub mod models;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use models::{AppSnapshot, Application, ResolvedRoute, Route, Service, ServiceKind};

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse store: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
}

/// Read access to the current configuration snapshot.
pub trait ConfigStore: Send + Sync {
    /// List every application with its routes resolved to their services.
    fn load_apps(&self) -> Result<Vec<AppSnapshot>, StoreError>;
}

/// Flat, serializable form of the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreDocument {
    pub services: Vec<Service>,
    pub apps: Vec<Application>,
    pub routes: Vec<Route>,
}

impl StoreDocument {
    /// Resolve route references into per-application snapshots.
    pub fn join(&self) -> Vec<AppSnapshot> {
        let services: HashMap<u64, &Service> = self.services.iter().map(|s| (s.id, s)).collect();
        let mut snapshots: Vec<AppSnapshot> = self
            .apps
            .iter()
            .map(|app| AppSnapshot {
                app: app.clone(),
                routes: Vec::new(),
            })
            .collect();
        let index: HashMap<u64, usize> = snapshots
            .iter()
            .enumerate()
            .map(|(i, snapshot)| (snapshot.app.id, i))
            .collect();
        let mut pairs = HashSet::new();

        for route in &self.routes {
            let Some(&slot) = index.get(&route.app_id) else {
                tracing::warn!(route_id = route.id, app_id = route.app_id, "Route references unknown app, skipping");
                continue;
            };
            let Some(service) = services.get(&route.service_id) else {
                tracing::warn!(
                    route_id = route.id,
                    service_id = route.service_id,
                    "Route references unknown service, skipping"
                );
                continue;
            };
            if !pairs.insert((route.app_id, route.service_id)) {
                tracing::warn!(
                    route_id = route.id,
                    app_id = route.app_id,
                    service_id = route.service_id,
                    "Duplicate route for app and service, skipping"
                );
                continue;
            }

            snapshots[slot].routes.push(ResolvedRoute {
                route: route.clone(),
                service: (*service).clone(),
            });
        }

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> StoreDocument {
        StoreDocument {
            services: vec![Service {
                id: 1,
                kind: ServiceKind::Sonarr,
                name: "Sonarr".into(),
                url: "http://svc:8989".into(),
                api_key: "UPSTREAMKEY".into(),
            }],
            apps: vec![Application {
                id: 10,
                template: "overseerr".into(),
                name: "Overseerr".into(),
                is_active: true,
            }],
            routes: vec![
                Route { id: 100, api_key: "abc123".into(), app_id: 10, service_id: 1 },
                Route { id: 101, api_key: "dup".into(), app_id: 10, service_id: 1 },
                Route { id: 102, api_key: "orphan".into(), app_id: 99, service_id: 1 },
                Route { id: 103, api_key: "nosvc".into(), app_id: 10, service_id: 42 },
            ],
        }
    }

    #[test]
    fn test_join_resolves_routes() {
        let snapshots = document().join();
        assert_eq!(snapshots.len(), 1);

        let routes = &snapshots[0].routes;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route.api_key, "abc123");
        assert_eq!(routes[0].service.api_key, "UPSTREAMKEY");
    }

    #[test]
    fn test_join_keeps_apps_without_routes() {
        let mut doc = document();
        doc.routes.clear();
        let snapshots = doc.join();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].routes.is_empty());
    }
}
