//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Store file edits:
//!     watcher.rs detects change
//!     → ReloadTrigger::StoreChanged
//!     → Reloader rebuilds and swaps the routing table
//! ```
//!
//! # Design Decisions
//! - Process settings are immutable once loaded; routing data reloads live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, StoreConfig,
    TemplatesConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
