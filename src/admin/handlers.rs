use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::http::credentials::redact;
use crate::http::server::AppState;
use crate::routing::ReloadReport;
use crate::templates::{Template, TemplateLookup};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub generation: u64,
    pub routes: usize,
    pub templates: usize,
}

#[derive(Serialize)]
pub struct EndpointSummary {
    pub method: String,
    pub pattern: String,
}

#[derive(Serialize)]
pub struct RouteSummary {
    pub route_id: String,
    /// Redacted client credential.
    pub api_key: String,
    pub app: String,
    pub service: String,
    pub kind: String,
    pub url: String,
    pub is_active: bool,
    pub endpoints: Vec<EndpointSummary>,
}

#[derive(Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub url: String,
    pub kinds: Vec<String>,
}

pub type AdminError = (StatusCode, Json<serde_json::Value>);

fn admin_error(status: StatusCode, message: impl ToString) -> AdminError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let table = state.reloader.table();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        generation: table.generation(),
        routes: table.len(),
        templates: state.reloader.templates().len(),
    })
}

/// Re-read templates and the store, then publish a new table.
pub async fn post_reload(State(state): State<AppState>) -> Result<Json<ReloadReport>, AdminError> {
    let reloader = Arc::clone(&state.reloader);
    let report = tokio::task::spawn_blocking(move || reloader.reload_all())
        .await
        .map_err(|e| admin_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .map_err(|e| admin_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    tracing::info!(generation = report.generation, routes = report.routes, "Reload requested via admin API");
    Ok(Json(report))
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteSummary>> {
    let table = state.reloader.table();
    let mut routes: Vec<RouteSummary> = table
        .entries()
        .map(|entry| RouteSummary {
            route_id: entry.route_id.clone(),
            api_key: redact(&entry.credential),
            app: entry.application.name.clone(),
            service: entry.service.name.clone(),
            kind: entry.service.kind.to_string(),
            url: entry.service.url.clone(),
            is_active: entry.is_active(),
            endpoints: entry
                .matcher
                .endpoints()
                .iter()
                .map(|e| EndpointSummary {
                    method: e.method().to_string(),
                    pattern: e.pattern().to_string(),
                })
                .collect(),
        })
        .collect();
    routes.sort_by(|a, b| a.route_id.cmp(&b.route_id));

    Json(routes)
}

pub async fn get_templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    let templates = state
        .reloader
        .templates()
        .list()
        .iter()
        .map(|t| TemplateSummary {
            id: t.id.clone(),
            name: t.name.clone(),
            url: t.url.clone(),
            kinds: t.endpoints.keys().cloned().collect(),
        })
        .collect();

    Json(templates)
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>, AdminError> {
    state
        .reloader
        .templates()
        .template(&id)
        .map(|template| Json(Template::clone(&template)))
        .ok_or_else(|| admin_error(StatusCode::NOT_FOUND, format!("template '{id}' not found")))
}
