//! Admin API, mounted under `/admin/v1` on the gateway listener.
//!
//! Every route requires the configured admin key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/v1/status", get(get_status))
        .route("/admin/v1/reload", post(post_reload))
        .route("/admin/v1/routes", get(get_routes))
        .route("/admin/v1/templates", get(get_templates))
        .route("/admin/v1/templates/{id}", get(get_template))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

#[cfg(test)]
mod tests {
    use crate::config::GatewayConfig;
    use crate::http::GatewayServer;
    use crate::routing::Reloader;
    use crate::store::{Application, MemoryStore, Route, Service, ServiceKind};
    use crate::templates::{Template, TemplateStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn server() -> GatewayServer {
        let store = Arc::new(MemoryStore::new());
        let service = store
            .create_service(Service {
                id: 0,
                kind: ServiceKind::Radarr,
                name: "Radarr".into(),
                url: "http://radarr:7878".into(),
                api_key: "RADARRKEY".into(),
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
                api_key: "0123456789abcdefghij".into(),
                app_id: app.id,
                service_id: service.id,
            })
            .unwrap();

        let templates = TemplateStore::from_templates([Template {
            id: "overseerr".into(),
            name: "Overseerr".into(),
            url: "https://overseerr.dev".into(),
            endpoints: [(
                "radarr".to_string(),
                [("/api/v3/movie/{id}".to_string(), vec!["GET".to_string()])].into(),
            )]
            .into(),
        }]);

        let reloader = Arc::new(Reloader::new(store, Arc::new(templates)));
        reloader.reload().unwrap();

        let mut config = GatewayConfig::default();
        config.audit.enabled = false;
        config.admin.enabled = true;
        config.admin.api_key = "admin-secret".into();
        GatewayServer::new(config, reloader).unwrap()
    }

    async fn call(method: &str, uri: &str, key: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            request = request.header("x-api-key", key);
        }
        let response = server().router().oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_admin_requires_key() {
        let (status, _) = call("GET", "/admin/v1/status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call("GET", "/admin/v1/status", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_routes_listing_redacts_credentials() {
        let (status, body) = call("GET", "/admin/v1/routes", Some("admin-secret")).await;
        assert_eq!(status, StatusCode::OK);

        let route = &body[0];
        assert_eq!(route["route_id"], "2-1");
        assert_eq!(route["api_key"], "0123456...defghij");
        assert_eq!(route["kind"], "radarr");
        assert_eq!(route["endpoints"][0]["method"], "GET");
        assert_eq!(route["endpoints"][0]["pattern"], "^/api/v3/movie/[^/]+$");
    }

    #[tokio::test]
    async fn test_reload_and_status() {
        let (status, body) = call("POST", "/admin/v1/reload", Some("admin-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generation"], 2);
        assert_eq!(body["routes"], 1);
        assert_eq!(body["published"], true);

        let (_, body) = call("GET", "/admin/v1/status", Some("admin-secret")).await;
        assert_eq!(body["generation"], 1);
        assert_eq!(body["templates"], 1);
    }

    #[tokio::test]
    async fn test_template_lookup() {
        let (status, body) = call("GET", "/admin/v1/templates/overseerr", Some("admin-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Overseerr");

        let (status, _) = call("GET", "/admin/v1/templates/missing", Some("admin-secret")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call("GET", "/admin/v1/templates", Some("admin-secret")).await;
        assert_eq!(body[0]["kinds"][0], "radarr");
    }
}
