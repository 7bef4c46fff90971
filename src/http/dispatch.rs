//! Per-request dispatch.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → credential (header, then query)         401 if missing
//!     → published table lookup                  401 if unknown
//!     → application active?                     401 if not
//!     → allow-list (METHOD, decoded path)       404 + no-cache if not
//!     → upstream URI from service base URL      500 if unparsable
//!     → credential swap, hop-by-hop strip, Host rewrite
//!     → upstream call under deadline            502 / 504
//!     → response streamed back under the same deadline,
//!       audit record on body completion
//! ```
//!
//! # Design Decisions
//! - One atomic table load per request; the `Arc<RouteEntry>` keeps the
//!   entry alive even if a reload swaps the table mid-request
//! - No retries and no body buffering
//! - Client credentials never reach the upstream, in any position

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri, Version},
    response::{IntoResponse, Response},
};
use futures_util::{stream, StreamExt};
use hyper::body::Incoming;
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::audit::{AuditRecord, PendingAudit};
use crate::error::GatewayError;
use crate::http::credentials::CredentialPolicy;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::RouteEntry;

/// Headers naming the route a request was dispatched to.
pub const X_PROXY_ID: &str = "x-proxy-id";
pub const X_PROXY_APP: &str = "x-proxy-app";
pub const X_PROXY_SERVICE: &str = "x-proxy-service";

/// Headers that describe one connection and are never forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Route identity attached to a dispatched request.
///
/// Written onto the inbound request and removed again when the upstream
/// request is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTags {
    pub id: String,
    pub app: String,
    pub service: String,
}

impl ProxyTags {
    pub fn for_entry(entry: &RouteEntry) -> Self {
        Self {
            id: entry.route_id.clone(),
            app: entry.application.name.clone(),
            service: entry.service.name.clone(),
        }
    }

    /// Write the tags as `X-Proxy-*` headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in [(X_PROXY_ID, &self.id), (X_PROXY_APP, &self.app), (X_PROXY_SERVICE, &self.service)] {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }
}

/// Request facts captured before the request is consumed.
struct RequestContext {
    request_id: String,
    remote_addr: String,
    method: String,
    url: String,
    user_agent: String,
}

impl RequestContext {
    fn capture(request: &Request<Body>, credentials: &CredentialPolicy) -> Self {
        let header = |name: &HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            request_id: header(&HeaderName::from_static("x-request-id")),
            remote_addr: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_default(),
            method: request.method().to_string(),
            url: credentials.sanitize_uri(request.uri()),
            user_agent: header(&header::USER_AGENT),
        }
    }

    fn audit_record(&self, tags: &ProxyTags, status: u16) -> AuditRecord {
        AuditRecord {
            request_id: self.request_id.clone(),
            remote_addr: self.remote_addr.clone(),
            method: self.method.clone(),
            url: self.url.clone(),
            status,
            app: tags.app.clone(),
            service: tags.service.clone(),
            user_agent: self.user_agent.clone(),
            ..Default::default()
        }
    }
}

/// Catch-all handler for every non-admin path.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let context = RequestContext::capture(&request, &state.credentials);

    let response = match resolve(&state, &request, &context) {
        Err(e) => e.into_response(),
        Ok(entry) => {
            let mut request = request;
            let tags = ProxyTags::for_entry(&entry);
            tags.apply(request.headers_mut());

            let response = match dispatch(&state, &entry, &context, request).await {
                Ok(response) => response,
                Err(e) => e.into_response(),
            };

            let record = context.audit_record(&tags, response.status().as_u16());
            let pending = PendingAudit::new(state.audit.logger(&tags.id), record, start);
            audited(response, pending)
        }
    };

    metrics::record_request(&context.method, response.status().as_u16(), start);
    response
}

/// Credential → active route entry.
fn resolve(
    state: &AppState,
    request: &Request<Body>,
    context: &RequestContext,
) -> Result<Arc<RouteEntry>, GatewayError> {
    let Some(credential) = state.credentials.resolve(request.headers(), request.uri()) else {
        tracing::error!(
            request_client = %context.remote_addr,
            request_method = %context.method,
            request_url = %context.url,
            "Missing API key"
        );
        return Err(GatewayError::Unauthenticated);
    };

    let Some(entry) = state.reloader.lookup(&credential) else {
        tracing::error!(
            request_client = %context.remote_addr,
            request_method = %context.method,
            request_url = %context.url,
            "Invalid API key"
        );
        return Err(GatewayError::Unauthenticated);
    };

    if !entry.is_active() {
        tracing::warn!(
            request_client = %context.remote_addr,
            request_method = %context.method,
            request_url = %context.url,
            proxy_app = %entry.application.name,
            app_is_active = false,
            "Inactive API key"
        );
        return Err(GatewayError::Unauthenticated);
    }

    Ok(entry)
}

/// Allow-list check, rewrite, forward.
async fn dispatch(
    state: &AppState,
    entry: &RouteEntry,
    context: &RequestContext,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let service = &entry.service;
    let path = request.uri().path().to_string();

    tracing::info!(
        request_id = %context.request_id,
        proxy_service = %service.name,
        proxy_app = %entry.application.name,
        proxy_type = %service.kind,
        proxy_url = %service.url,
        request_client = %context.remote_addr,
        request_method = %context.method,
        request_url = %context.url,
        "Proxying request"
    );

    if !allowed(entry, &context.method, &path) {
        tracing::error!(
            request_id = %context.request_id,
            proxy_service = %service.name,
            proxy_app = %entry.application.name,
            proxy_type = %service.kind,
            request_method = %context.method,
            request_url = %context.url,
            "Forbidden, endpoint not allowed"
        );
        return Err(GatewayError::Forbidden {
            method: context.method.clone(),
            path,
        });
    }

    let outbound = match build_upstream_request(&state.credentials, entry, request) {
        Ok(outbound) => outbound,
        Err(e) => {
            tracing::error!(
                request_id = %context.request_id,
                error = %e,
                proxy_service = %service.name,
                proxy_app = %entry.application.name,
                proxy_type = %service.kind,
                request_url = %context.url,
                "Invalid service URL"
            );
            return Err(e);
        }
    };

    let deadline = state.config.timeouts.upstream_secs;
    let expires = tokio::time::Instant::now() + Duration::from_secs(deadline);
    let response = match tokio::time::timeout_at(expires, state.client.request(outbound)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(
                request_id = %context.request_id,
                error = %e,
                proxy_service = %service.name,
                proxy_url = %service.url,
                "Upstream error"
            );
            return Err(GatewayError::Upstream(e.to_string()));
        }
        Err(_) => {
            tracing::error!(
                request_id = %context.request_id,
                proxy_service = %service.name,
                proxy_url = %service.url,
                timeout_secs = deadline,
                "Upstream timed out"
            );
            return Err(GatewayError::UpstreamTimeout(deadline));
        }
    };

    Ok(relay(response, expires, deadline))
}

/// Allow-list check against the percent-decoded path. A path that does not
/// decode to UTF-8 matches nothing.
fn allowed(entry: &RouteEntry, method: &str, raw_path: &str) -> bool {
    percent_decode_str(raw_path)
        .decode_utf8()
        .is_ok_and(|path| entry.allows(method, &path))
}

/// Hand an upstream response back to the client, body unbuffered.
///
/// The upstream deadline also covers the body: a frame still outstanding
/// when it passes ends the stream with an error, which drops the upstream
/// connection and aborts the client response.
fn relay(response: hyper::Response<Incoming>, expires: tokio::time::Instant, deadline: u64) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    let frames = Body::new(body).into_data_stream();
    let stream = stream::unfold(Some(frames), move |frames| async move {
        let mut frames = frames?;
        match tokio::time::timeout_at(expires, frames.next()).await {
            Ok(Some(frame)) => Some((frame, Some(frames))),
            Ok(None) => None,
            Err(_) => {
                tracing::error!(timeout_secs = deadline, "Upstream body timed out");
                Some((Err(axum::Error::new(GatewayError::UpstreamTimeout(deadline))), None))
            }
        }
    });
    Response::from_parts(parts, Body::from_stream(stream))
}

/// Rewrite an inbound request for the entry's upstream service.
pub fn build_upstream_request(
    credentials: &CredentialPolicy,
    entry: &RouteEntry,
    request: Request<Body>,
) -> Result<Request<Body>, GatewayError> {
    let service = &entry.service;
    let base = Url::parse(&service.url).map_err(|e| GatewayError::Internal(format!("{}: {e}", service.url)))?;
    let (uri, authority) = upstream_uri(&base, request.uri(), credentials)?;
    let upstream_key = HeaderValue::from_str(&service.api_key)
        .map_err(|_| GatewayError::Internal(format!("service {} api key is not a valid header value", service.name)))?;
    let host = HeaderValue::from_str(&authority).map_err(|e| GatewayError::Internal(e.to_string()))?;

    let (mut parts, body) = request.into_parts();
    let headers = &mut parts.headers;
    strip_hop_by_hop(headers);
    headers.remove(credentials.client_header());
    for tag in [X_PROXY_ID, X_PROXY_APP, X_PROXY_SERVICE] {
        headers.remove(tag);
    }
    headers.insert(credentials.upstream_header().clone(), upstream_key);
    headers.insert(header::HOST, host);

    parts.uri = uri;
    parts.version = Version::HTTP_11;
    Ok(Request::from_parts(parts, body))
}

/// Upstream URI and authority: base scheme and host, base path joined
/// with the inbound path, inbound query minus the credential.
pub fn upstream_uri(base: &Url, inbound: &Uri, credentials: &CredentialPolicy) -> Result<(Uri, String), GatewayError> {
    let host = base
        .host_str()
        .ok_or_else(|| GatewayError::Internal(format!("{base}: missing host")))?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut path_and_query = base.path().trim_end_matches('/').to_string();
    path_and_query.push_str(inbound.path());
    if let Some(query) = inbound.query().and_then(|q| credentials.strip_query(q)) {
        path_and_query.push('?');
        path_and_query.push_str(&query);
    }

    let uri = Uri::builder()
        .scheme(base.scheme())
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok((uri, authority))
}

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Stream the body through an audit byte counter.
fn audited(response: Response, mut pending: PendingAudit) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        if let Ok(bytes) = &chunk {
            pending.add_bytes(bytes.len());
        }
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}
