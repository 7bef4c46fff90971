//! TOML file store.
//!
//! The file holds `[[services]]`, `[[apps]]` and `[[routes]]` tables:
//!
//! ```toml
//! [[services]]
//! id = 1
//! kind = "sonarr"
//! name = "Sonarr"
//! url = "http://sonarr:8989"
//! api_key = "..."
//!
//! [[apps]]
//! id = 1
//! template = "overseerr"
//! name = "Overseerr"
//!
//! [[routes]]
//! id = 1
//! api_key = "..."
//! app_id = 1
//! service_id = 1
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::store::{AppSnapshot, ConfigStore, StoreDocument, StoreError};

/// Store reading the whole configuration from one TOML file on every load.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the store document.
    pub fn read_document(&self) -> Result<StoreDocument, StoreError> {
        let content = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl ConfigStore for FileStore {
    fn load_apps(&self) -> Result<Vec<AppSnapshot>, StoreError> {
        Ok(self.read_document()?.join())
    }
}
