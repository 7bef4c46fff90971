//! Configuration schema definitions.
//!
//! Process settings for the gateway. The routing data itself (services,
//! applications, routes) lives in the store file named by `store.path`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Credential translation settings.
    pub proxy: ProxyConfig,

    /// Where services, applications and routes are read from.
    pub store: StoreConfig,

    /// Endpoint template location.
    pub templates: TemplatesConfig,

    /// Per-route audit log sinks.
    pub audit: AuditConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for the client and upstream legs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for one client request, in seconds.
    pub request_secs: u64,

    /// Deadline for the upstream response headers, in seconds.
    pub upstream_secs: u64,

    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            upstream_secs: 30,
            connect_secs: 5,
        }
    }
}

/// Where credentials are read from and written to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Header carrying the client credential.
    pub client_header: String,

    /// Query parameter carrying the client credential (fallback).
    pub client_query_param: String,

    /// Header carrying the upstream service credential.
    pub upstream_header: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            client_header: "X-Api-Key".to_string(),
            client_query_param: "apikey".to_string(),
            upstream_header: "X-Api-Key".to_string(),
        }
    }
}

/// Store file settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// TOML file with `[[services]]`, `[[apps]]` and `[[routes]]`.
    pub path: PathBuf,

    /// Rebuild the routing table when the file changes.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/store.toml"),
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory of `<id>.json` template files.
    pub directory: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("templates"),
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write per-route audit records.
    pub enabled: bool,

    /// Directory holding `<route_id>.log` files.
    pub directory: PathBuf,

    /// Rotate once a file reaches this many bytes.
    pub max_file_bytes: usize,

    /// Delete rotated files older than this many days.
    pub max_age_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("logs"),
            max_file_bytes: 50 * 1024 * 1024,
            max_age_days: 30,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API under `/admin/v1`.
    pub enabled: bool,

    /// API key for authentication (Bearer token or X-Api-Key).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive.
    pub log_level: String,

    /// Emit JSON logs instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
