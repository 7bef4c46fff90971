//! Configuration records owned by the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of supported upstream backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Lidarr,
    Prowlarr,
    Radarr,
    Sonarr,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Lidarr,
        ServiceKind::Prowlarr,
        ServiceKind::Radarr,
        ServiceKind::Sonarr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Lidarr => "lidarr",
            ServiceKind::Prowlarr => "prowlarr",
            ServiceKind::Radarr => "radarr",
            ServiceKind::Sonarr => "sonarr",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no supported service kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported service kind '{0}'")]
pub struct UnknownServiceKind(pub String);

impl FromStr for ServiceKind {
    type Err = UnknownServiceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownServiceKind(s.to_string()))
    }
}

/// An upstream service instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Service {
    pub id: u64,
    pub kind: ServiceKind,
    pub name: String,
    /// Base URL, e.g. `http://sonarr:8989`.
    pub url: String,
    /// The upstream's own credential. Never shown to clients.
    pub api_key: String,
}

/// A client application bound to a template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Application {
    pub id: u64,
    /// Template id declaring which endpoints the application may reach.
    pub template: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// One application/service pairing reachable through a client credential.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Route {
    pub id: u64,
    #[serde(default)]
    pub api_key: String,
    pub app_id: u64,
    pub service_id: u64,
}

/// A route joined with the service it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub route: Route,
    pub service: Service,
}

/// An application with all of its resolved routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSnapshot {
    pub app: Application,
    pub routes: Vec<ResolvedRoute>,
}
