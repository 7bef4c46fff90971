//! Gateway error taxonomy and its HTTP mapping.
//!
//! # Design Decisions
//! - Unknown, missing and inactive credentials all map to the same 401
//! - A disallowed method/path is reported as 404, never 403
//! - Response bodies never carry internal detail

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the routing core and the request dispatcher.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No credential, an unknown credential, or an inactive application.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Credential is valid but the method/path is not in its allow-list.
    #[error("{method} {path} not allowed")]
    Forbidden { method: String, path: String },

    /// Misconfigured upstream target.
    #[error("internal error: {0}")]
    Internal(String),

    /// Template malformed or endpoint pattern uncompilable. Reload only.
    #[error("template error: {0}")]
    Template(String),

    /// Template or service-kind reference missing. Reload only.
    #[error("{0} not found")]
    NotFound(String),

    /// The forwarded call failed before a response arrived.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The forwarded call exceeded the upstream deadline.
    #[error("upstream timed out after {0} seconds")]
    UpstreamTimeout(u64),

    /// The configuration store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// HTTP status presented to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_)
            | GatewayError::Template(_)
            | GatewayError::NotFound(_)
            | GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = self.status_code().into_response();

        if matches!(self, GatewayError::Forbidden { .. }) {
            let headers = response.headers_mut();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("-1"));
        }

        response
    }
}
