//! Endpoint template collaborator.
//!
//! # Responsibilities
//! - Load template documents (`<dir>/<id>.json`)
//! - Reject structurally invalid templates (per file, never the whole set)
//! - Resolve templates by id for the routing table builder
//!
//! # Design Decisions
//! - The loaded set is an immutable map swapped atomically on reload
//! - Fetching templates from a remote repository is not done here

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::store::ServiceKind;

/// Path pattern → allowed methods.
pub type EndpointDeclarations = BTreeMap<String, Vec<String>>;

/// Service kind → endpoint declarations.
pub type TemplateEndpoints = BTreeMap<String, EndpointDeclarations>;

/// A declarative description of what an application may call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    /// Where the templated application lives, for operators.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub endpoints: TemplateEndpoints,
}

impl Template {
    /// Endpoint declarations for one service kind, if the template has any.
    pub fn endpoints_for(&self, kind: ServiceKind) -> Option<&EndpointDeclarations> {
        self.endpoints
            .iter()
            .find(|(declared, _)| declared.eq_ignore_ascii_case(kind.as_str()))
            .map(|(_, declarations)| declarations)
    }

    /// Structural checks: identity, name, non-empty endpoints, known kinds.
    pub fn validate(&self) -> Result<(), TemplateLoadError> {
        let invalid = |reason: String| TemplateLoadError::Invalid {
            id: self.id.clone(),
            reason,
        };

        if self.id.is_empty() {
            return Err(invalid("missing template id".into()));
        }
        if self.name.is_empty() {
            return Err(invalid("missing template name".into()));
        }
        if self.endpoints.is_empty() {
            return Err(invalid("missing template endpoints".into()));
        }
        for kind in self.endpoints.keys() {
            kind.parse::<ServiceKind>().map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// Errors raised while loading templates.
#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("failed to read templates from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template '{id}' is invalid: {reason}")]
    Invalid { id: String, reason: String },
}

/// Resolve a validated template by id.
pub trait TemplateLookup: Send + Sync {
    fn template(&self, id: &str) -> Option<Arc<Template>>;
}

type TemplateMap = HashMap<String, Arc<Template>>;

/// The currently loaded template set.
#[derive(Debug)]
pub struct TemplateStore {
    directory: Option<PathBuf>,
    templates: ArcSwap<TemplateMap>,
}

impl TemplateStore {
    /// Build a store from in-memory templates. Invalid ones are skipped.
    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let map = templates
            .into_iter()
            .filter(|template| match template.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping invalid template");
                    false
                }
            })
            .map(|template| (template.id.clone(), Arc::new(template)))
            .collect();

        Self {
            directory: None,
            templates: ArcSwap::from_pointee(map),
        }
    }

    /// Load every `*.json` template in `directory`.
    pub fn load_dir(directory: impl Into<PathBuf>) -> Result<Self, TemplateLoadError> {
        let directory = directory.into();
        let map = read_directory(&directory)?;
        tracing::info!(path = %directory.display(), templates = map.len(), "Templates loaded");

        Ok(Self {
            directory: Some(directory),
            templates: ArcSwap::from_pointee(map),
        })
    }

    /// Re-read the template directory and swap in the new set.
    ///
    /// On error the previous set stays in force. Stores built from in-memory
    /// templates keep their set unchanged.
    pub fn reload(&self) -> Result<usize, TemplateLoadError> {
        let Some(directory) = &self.directory else {
            return Ok(self.len());
        };

        let map = read_directory(directory)?;
        let count = map.len();
        self.templates.store(Arc::new(map));
        tracing::info!(path = %directory.display(), templates = count, "Templates reloaded");
        Ok(count)
    }

    /// All templates, ordered by id.
    pub fn list(&self) -> Vec<Arc<Template>> {
        let mut templates: Vec<_> = self.templates.load().values().cloned().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    /// The current set, frozen. Later reloads do not affect it.
    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot(self.templates.load_full())
    }

    pub fn len(&self) -> usize {
        self.templates.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateLookup for TemplateStore {
    fn template(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.load().get(id).cloned()
    }
}

/// One consistent template set, for resolving a whole table build.
#[derive(Debug, Clone)]
pub struct TemplateSnapshot(Arc<TemplateMap>);

impl TemplateLookup for TemplateSnapshot {
    fn template(&self, id: &str) -> Option<Arc<Template>> {
        self.0.get(id).cloned()
    }
}

fn read_directory(directory: &Path) -> Result<TemplateMap, TemplateLoadError> {
    let io_error = |source| TemplateLoadError::Io {
        path: directory.to_path_buf(),
        source,
    };

    let mut files: Vec<PathBuf> = fs::read_dir(directory)
        .map_err(io_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut map = TemplateMap::new();
    for path in files {
        match read_template(&path) {
            Ok(template) => {
                map.insert(template.id.clone(), Arc::new(template));
            }
            Err(e) => {
                tracing::warn!(template_file = %path.display(), error = %e, "Skipping template file");
            }
        }
    }
    Ok(map)
}

fn read_template(path: &Path) -> Result<Template, TemplateLoadError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let invalid = |reason: String| TemplateLoadError::Invalid {
        id: stem.clone(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let template: Template = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    template.validate()?;
    if template.id != stem {
        return Err(invalid(format!("template id '{}' does not match file name", template.id)));
    }
    Ok(template)
}
