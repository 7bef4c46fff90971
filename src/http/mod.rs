//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, timeout, trace layers)
//!     → /admin/v1/* → admin API
//!     → anything else → dispatch.rs
//!         → credentials.rs (extract, strip, redact)
//!         → routing (lookup, allow-list)
//!         → upstream service via hyper client
//!     → response streamed back to the client
//! ```

pub mod credentials;
pub mod dispatch;
pub mod server;

pub use credentials::{redact, CredentialPolicy};
pub use dispatch::{proxy_handler, ProxyTags, X_PROXY_APP, X_PROXY_ID, X_PROXY_SERVICE};
pub use server::{upstream_client, AppState, GatewayServer, UpstreamClient};
