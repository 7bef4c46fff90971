//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Table build (startup, store change, manual reload):
//!     ConfigStore::load_apps() + TemplateLookup
//!     → table.rs (join, compile allow-lists, index by credential)
//!     → reloader.rs (generation guard, atomic publish)
//!
//! Per request:
//!     credential → Reloader::lookup (one atomic load)
//!     → RouteEntry (active flag, upstream service)
//!     → matcher.rs (METHOD + path allowed?)
//! ```
//!
//! # Design Decisions
//! - Tables are immutable once built; reload replaces, never edits
//! - Regexes compiled at build time, never per request
//! - Bad apps or routes degrade individually, the rest still route

pub mod matcher;
pub mod reloader;
pub mod table;

pub use matcher::{path_regex, Endpoint, EndpointMatcher};
pub use reloader::{ReloadReport, ReloadTrigger, Reloader};
pub use table::{RouteEntry, RoutingTable};
