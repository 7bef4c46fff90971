//! Endpoint allow-list matching.
//!
//! # Responsibilities
//! - Compile `{path → [method]}` declarations into anchored regexes
//! - Answer "is METHOD PATH allowed" for a request
//!
//! # Design Decisions
//! - Compiled once per route at table-build time, immutable afterwards
//! - Path matching is case-insensitive (upstream casing is not guaranteed)
//! - Method matching is exact against the uppercased declarations
//! - A `{name}` placeholder matches exactly one non-empty path segment

use regex::{Regex, RegexBuilder};

use crate::error::GatewayError;
use crate::templates::EndpointDeclarations;

/// One allowed `(METHOD, path pattern)` pair.
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: String,
    pattern: Regex,
}

impl Endpoint {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The compiled regex source.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        self.method == method && self.pattern.is_match(path)
    }
}

/// Compiled allow-list for one route.
#[derive(Debug, Clone, Default)]
pub struct EndpointMatcher {
    endpoints: Vec<Endpoint>,
}

impl EndpointMatcher {
    /// Compile endpoint declarations.
    pub fn compile(declarations: &EndpointDeclarations) -> Result<Self, GatewayError> {
        let mut endpoints = Vec::new();

        for (path, methods) in declarations {
            let source = path_regex(path);
            let pattern = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .map_err(|e| GatewayError::Template(format!("invalid endpoint pattern {path}: {e}")))?;

            for method in methods {
                endpoints.push(Endpoint {
                    method: method.to_uppercase(),
                    pattern: pattern.clone(),
                });
            }
        }

        Ok(Self { endpoints })
    }

    /// Returns true if some declared endpoint allows `method` on `path`.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.endpoints.iter().any(|e| e.matches(method, path))
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Translate a path template into an anchored regex source.
///
/// Literal text is escaped; each `{identifier}` becomes `[^/]+`.
pub fn path_regex(path: &str) -> String {
    let mut pattern = String::with_capacity(path.len() + 8);
    pattern.push('^');

    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + len];

        if name.is_empty() || name.contains('/') {
            // Not a placeholder, keep the brace as a literal.
            pattern.push_str(&regex::escape(&rest[..=open]));
            rest = &rest[open + 1..];
            continue;
        }

        pattern.push_str(&regex::escape(&rest[..open]));
        pattern.push_str("[^/]+");
        rest = &rest[open + len + 1..];
    }

    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    pattern
}
