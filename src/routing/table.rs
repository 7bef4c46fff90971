//! Credential routing table.
//!
//! # Responsibilities
//! - Join apps, routes, services and templates into resolvable entries
//! - Index entries by client credential
//! - Degrade per entry: a bad app or route never fails the whole build
//!
//! # Design Decisions
//! - Immutable after construction (readers need no synchronization)
//! - Entries are `Arc`ed so in-flight requests outlive table swaps
//! - Credential collisions resolve last-write-wins

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::routing::matcher::EndpointMatcher;
use crate::store::{AppSnapshot, Application, Service};
use crate::templates::{EndpointDeclarations, Template, TemplateLookup};

/// A resolvable route: credential, upstream target and allow-list.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub credential: String,
    /// Stable identifier derived from application and service ids.
    pub route_id: String,
    pub application: Application,
    pub service: Service,
    pub matcher: EndpointMatcher,
}

impl RouteEntry {
    pub fn route_id(app_id: u64, service_id: u64) -> String {
        format!("{app_id}-{service_id}")
    }

    pub fn is_active(&self) -> bool {
        self.application.is_active
    }

    pub fn allows(&self, method: &str, path: &str) -> bool {
        self.matcher.matches(method, path)
    }
}

/// Immutable credential → entry map.
#[derive(Debug, Default)]
pub struct RoutingTable {
    generation: u64,
    entries: HashMap<String, Arc<RouteEntry>>,
}

impl RoutingTable {
    /// An empty table at generation zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from a configuration snapshot.
    pub fn build(generation: u64, apps: &[AppSnapshot], templates: &dyn TemplateLookup) -> Self {
        let mut entries = HashMap::new();
        let no_declarations = EndpointDeclarations::new();

        for snapshot in apps {
            let app = &snapshot.app;
            let template = match resolve_template(templates, app) {
                Ok(template) => template,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        app_name = %app.name,
                        app_template = %app.template,
                        routes = snapshot.routes.len(),
                        "Invalid template, no route will be configured"
                    );
                    continue;
                }
            };

            for resolved in &snapshot.routes {
                let service = &resolved.service;
                let declarations = template.endpoints_for(service.kind).unwrap_or(&no_declarations);

                let matcher = match EndpointMatcher::compile(declarations) {
                    Ok(matcher) => matcher,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            app_name = %app.name,
                            app_template = %app.template,
                            proxy_service = %service.name,
                            "Invalid template endpoint, route will not be configured"
                        );
                        continue;
                    }
                };

                if matcher.is_empty() {
                    tracing::warn!(
                        proxy_service = %service.name,
                        proxy_app = %app.name,
                        proxy_type = %service.kind,
                        proxy_url = %service.url,
                        "No endpoints present"
                    );
                }

                let credential = resolved.route.api_key.clone();
                if credential.is_empty() {
                    tracing::error!(
                        proxy_service = %service.name,
                        proxy_app = %app.name,
                        proxy_type = %service.kind,
                        proxy_url = %service.url,
                        "Missing api key, route will not be configured"
                    );
                    continue;
                }

                let entry = RouteEntry {
                    credential: credential.clone(),
                    route_id: RouteEntry::route_id(app.id, service.id),
                    application: app.clone(),
                    service: service.clone(),
                    matcher,
                };

                if let Some(previous) = entries.insert(credential, Arc::new(entry)) {
                    tracing::warn!(
                        replaced_route = %previous.route_id,
                        proxy_app = %app.name,
                        proxy_service = %service.name,
                        "Duplicate api key, later route wins"
                    );
                }
            }
        }

        Self { generation, entries }
    }

    pub fn get(&self, credential: &str) -> Option<&Arc<RouteEntry>> {
        self.entries.get(credential)
    }

    /// Generation of the configuration read this table was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<RouteEntry>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve_template(templates: &dyn TemplateLookup, app: &Application) -> Result<Arc<Template>, GatewayError> {
    templates
        .template(&app.template)
        .ok_or_else(|| GatewayError::NotFound(format!("template '{}'", app.template)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ResolvedRoute, Route, ServiceKind};
    use crate::templates::{Template, TemplateStore};

    fn templates() -> TemplateStore {
        TemplateStore::from_templates([Template {
            id: "overseerr".into(),
            name: "Overseerr".into(),
            url: String::new(),
            endpoints: [
                (
                    "sonarr".to_string(),
                    [("/api/v3/queue".to_string(), vec!["GET".to_string()])].into(),
                ),
                ("radarr".to_string(), EndpointDeclarations::new()),
            ]
            .into(),
        }])
    }

    fn app(id: u64, template: &str, routes: Vec<ResolvedRoute>) -> AppSnapshot {
        AppSnapshot {
            app: Application {
                id,
                template: template.into(),
                name: format!("app-{id}"),
                is_active: true,
            },
            routes,
        }
    }

    fn route(app_id: u64, service_id: u64, key: &str, kind: ServiceKind) -> ResolvedRoute {
        ResolvedRoute {
            route: Route {
                id: app_id * 100 + service_id,
                api_key: key.into(),
                app_id,
                service_id,
            },
            service: Service {
                id: service_id,
                kind,
                name: format!("svc-{service_id}"),
                url: "http://svc:8989".into(),
                api_key: "UPSTREAMKEY".into(),
            },
        }
    }

    #[test]
    fn test_build_skips_apps_with_unresolvable_templates() {
        let apps = vec![
            app(1, "overseerr", vec![route(1, 1, "k1", ServiceKind::Sonarr)]),
            app(2, "missing", vec![route(2, 1, "k2", ServiceKind::Sonarr)]),
            app(3, "overseerr", vec![route(3, 1, "k3", ServiceKind::Sonarr)]),
        ];

        let table = RoutingTable::build(1, &apps, &templates());

        assert_eq!(table.len(), 2);
        assert!(table.get("k1").is_some());
        assert!(table.get("k2").is_none());
        assert!(table.get("k3").is_some());
        assert_eq!(table.generation(), 1);
    }

    #[test]
    fn test_unknown_template_is_not_found() {
        let missing = app(2, "missing", Vec::new());
        let err = resolve_template(&templates(), &missing.app).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(ref what) if what == "template 'missing'"));

        let known = app(1, "overseerr", Vec::new());
        assert_eq!(resolve_template(&templates(), &known.app).unwrap().id, "overseerr");
    }

    #[test]
    fn test_build_keeps_routes_without_endpoints() {
        let apps = vec![app(
            1,
            "overseerr",
            vec![
                route(1, 1, "radarr-key", ServiceKind::Radarr),
                route(1, 2, "lidarr-key", ServiceKind::Lidarr),
            ],
        )];

        let table = RoutingTable::build(1, &apps, &templates());

        let radarr = table.get("radarr-key").unwrap();
        assert!(radarr.matcher.is_empty());
        assert!(table.get("lidarr-key").unwrap().matcher.is_empty());
    }

    #[test]
    fn test_build_drops_routes_without_credential() {
        let apps = vec![app(1, "overseerr", vec![route(1, 1, "", ServiceKind::Sonarr)])];
        let table = RoutingTable::build(1, &apps, &templates());
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_credentials_last_write_wins() {
        let apps = vec![
            app(1, "overseerr", vec![route(1, 1, "same", ServiceKind::Sonarr)]),
            app(2, "overseerr", vec![route(2, 1, "same", ServiceKind::Sonarr)]),
        ];

        let table = RoutingTable::build(1, &apps, &templates());

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("same").unwrap().application.id, 2);
    }

    #[test]
    fn test_entry_identity_and_allow_list() {
        let apps = vec![app(4, "overseerr", vec![route(4, 9, "abc123", ServiceKind::Sonarr)])];
        let table = RoutingTable::build(1, &apps, &templates());
        let entry = table.get("abc123").unwrap();

        assert_eq!(entry.route_id, "4-9");
        assert!(entry.is_active());
        assert!(entry.allows("GET", "/api/v3/queue"));
        assert!(!entry.allows("DELETE", "/api/v3/queue"));
    }
}
