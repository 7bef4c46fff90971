//! Table builder and publisher.
//!
//! # Responsibilities
//! - Read the current configuration and templates
//! - Build a fresh `RoutingTable` and publish it atomically
//! - Serve lock-free lookups against the published table
//!
//! # Design Decisions
//! - The published table is never mutated, only replaced
//! - Each rebuild draws its generation before reading the store; an older
//!   rebuild that finishes late is dropped instead of overwriting a newer one
//! - A failed rebuild leaves the last good table in force

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::routing::table::{RouteEntry, RoutingTable};
use crate::store::ConfigStore;
use crate::templates::TemplateStore;

/// What asked for a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// The backing store changed on disk.
    StoreChanged,
    /// An operator asked for a full reload (SIGHUP, admin API).
    Manual,
}

/// Outcome of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    pub routes: usize,
    /// False when a newer table was already published.
    pub published: bool,
}

/// Owns the published routing table.
pub struct Reloader {
    table: ArcSwap<RoutingTable>,
    store: Arc<dyn ConfigStore>,
    templates: Arc<TemplateStore>,
    generation: AtomicU64,
}

impl Reloader {
    /// Create a reloader with an empty table. Call `reload` before serving.
    pub fn new(store: Arc<dyn ConfigStore>, templates: Arc<TemplateStore>) -> Self {
        Self {
            table: ArcSwap::from_pointee(RoutingTable::empty()),
            store,
            templates,
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the currently published table.
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Resolve a client credential against the published table.
    pub fn lookup(&self, credential: &str) -> Option<Arc<RouteEntry>> {
        self.table.load().get(credential).cloned()
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    /// Rebuild the table from the store and publish it.
    pub fn reload(&self) -> Result<ReloadReport, GatewayError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let apps = match self.store.load_apps() {
            Ok(apps) => apps,
            Err(e) => {
                tracing::error!(error = %e, generation, "Failed to read configuration, keeping current routes");
                metrics::record_reload("failed");
                return Err(e.into());
            }
        };

        let templates = self.templates.snapshot();
        let table = Arc::new(RoutingTable::build(generation, &apps, &templates));
        let routes = table.len();
        let published = self.publish(table);

        if published {
            tracing::info!(generation, routes, apps = apps.len(), "Routing table published");
            metrics::record_reload("published");
            metrics::set_route_count(routes);
        } else {
            tracing::debug!(generation, "Newer routing table already published, discarding");
            metrics::record_reload("stale");
        }

        Ok(ReloadReport {
            generation,
            routes,
            published,
        })
    }

    /// Re-read templates, then rebuild the table.
    ///
    /// A template directory failure keeps the previous template set and still
    /// rebuilds, so store edits are never blocked by a broken template dir.
    pub fn reload_all(&self) -> Result<ReloadReport, GatewayError> {
        if let Err(e) = self.templates.reload() {
            tracing::error!(error = %e, "Failed to reload templates, keeping current set");
        }
        self.reload()
    }

    /// Run a store mutation, then rebuild the table.
    pub fn apply<T, E>(&self, mutation: impl FnOnce() -> Result<T, E>) -> Result<T, GatewayError>
    where
        GatewayError: From<E>,
    {
        let value = mutation()?;
        self.reload()?;
        Ok(value)
    }

    fn publish(&self, table: Arc<RoutingTable>) -> bool {
        let generation = table.generation();
        let previous = self.table.rcu(|current| {
            if current.generation() < generation {
                Arc::clone(&table)
            } else {
                Arc::clone(current)
            }
        });
        previous.generation() < generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AppSnapshot, Application, MemoryStore, Route, Service, ServiceKind, StoreError};
    use crate::templates::{EndpointDeclarations, Template};
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn templates() -> Arc<TemplateStore> {
        let declarations: EndpointDeclarations =
            [("/api/v3/queue".to_string(), vec!["GET".to_string()])].into();
        Arc::new(TemplateStore::from_templates([Template {
            id: "overseerr".into(),
            name: "Overseerr".into(),
            url: String::new(),
            endpoints: [("sonarr".to_string(), declarations)].into(),
        }]))
    }

    fn seeded() -> (Arc<MemoryStore>, Application) {
        let store = Arc::new(MemoryStore::new());
        let service = store
            .create_service(Service {
                id: 0,
                kind: ServiceKind::Sonarr,
                name: "Sonarr".into(),
                url: "http://svc:8989".into(),
                api_key: "UPSTREAMKEY".into(),
            })
            .unwrap();
        let app = store
            .create_app(Application {
                id: 0,
                template: "overseerr".into(),
                name: "Overseerr".into(),
                is_active: true,
            })
            .unwrap();
        store
            .create_route(Route {
                id: 0,
                api_key: "abc123".into(),
                app_id: app.id,
                service_id: service.id,
            })
            .unwrap();
        (store, app)
    }

    struct BrokenStore;

    impl ConfigStore for BrokenStore {
        fn load_apps(&self) -> Result<Vec<AppSnapshot>, StoreError> {
            Err(StoreError::Conflict("unavailable".into()))
        }
    }

    #[test]
    fn test_reload_publishes_table() {
        let (store, _) = seeded();
        let reloader = Reloader::new(store, templates());
        assert!(reloader.lookup("abc123").is_none());

        let report = reloader.reload().unwrap();
        assert!(report.published);
        assert_eq!(report.routes, 1);
        assert_eq!(reloader.table().generation(), report.generation);

        let entry = reloader.lookup("abc123").unwrap();
        assert_eq!(entry.service.api_key, "UPSTREAMKEY");
    }

    #[test]
    fn test_inactive_application_observed_after_reload() {
        let (store, app) = seeded();
        let reloader = Reloader::new(store.clone(), templates());
        reloader.reload().unwrap();

        let before = reloader.lookup("abc123").unwrap();
        reloader.apply(|| store.set_app_active(app.id, false)).unwrap();

        // The entry held by an in-flight request is untouched.
        assert!(before.is_active());
        assert!(!reloader.lookup("abc123").unwrap().is_active());
    }

    #[test]
    fn test_failed_reload_keeps_current_table() {
        let (store, _) = seeded();
        let good = Reloader::new(store, templates());
        good.reload().unwrap();

        let reloader = Reloader {
            table: ArcSwap::new(good.table()),
            store: Arc::new(BrokenStore),
            templates: templates(),
            generation: AtomicU64::new(good.table().generation()),
        };

        assert!(matches!(reloader.reload(), Err(GatewayError::Store(_))));
        assert!(reloader.lookup("abc123").is_some());
    }

    #[test]
    fn test_stale_generation_is_not_published() {
        let (store, _) = seeded();
        let reloader = Reloader::new(store, templates());
        reloader.reload().unwrap();
        reloader.reload().unwrap();
        let current = reloader.table().generation();

        let stale = Arc::new(RoutingTable::build(current - 1, &[], &**reloader.templates()));
        assert!(!reloader.publish(stale));
        assert_eq!(reloader.table().generation(), current);
        assert!(reloader.lookup("abc123").is_some());
    }

    #[test]
    fn test_apply_propagates_mutation_errors() {
        let (store, app) = seeded();
        let reloader = Reloader::new(store.clone(), templates());

        let result = reloader.apply(|| store.delete_app(app.id));
        assert!(matches!(result, Err(GatewayError::Store(StoreError::Conflict(_)))));
    }

    #[test]
    fn test_readers_see_whole_tables_during_reloads() {
        let (store, app) = seeded();
        let reloader = Arc::new(Reloader::new(store.clone(), templates()));
        reloader.reload().unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reloader = Arc::clone(&reloader);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last_generation = 0;
                    while !done.load(Ordering::Relaxed) {
                        let table = reloader.table();
                        assert!(table.generation() >= last_generation);
                        last_generation = table.generation();

                        let entry = table.get("abc123").expect("route present in every table");
                        assert_eq!(entry.route_id, format!("{}-1", app.id));
                    }
                })
            })
            .collect();

        for i in 0..200 {
            reloader.apply(|| store.set_app_active(app.id, i % 2 == 0)).unwrap();
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(reloader.table().generation(), 201);
    }
}
