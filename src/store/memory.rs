//! In-process store with record mutations.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::store::{AppSnapshot, Application, ConfigStore, Route, Service, StoreDocument, StoreError};

/// Generate an opaque client credential.
pub fn generate_api_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Default)]
struct Inner {
    document: StoreDocument,
    next_id: u64,
}

impl Inner {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A mutable configuration store kept in memory.
///
/// Enforces the record invariants the routing core relies on: unique names,
/// one route per app/service pair, unique route credentials, and no deletion
/// of apps or services still referenced by routes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from an existing document. Ids are kept as given.
    pub fn from_document(document: StoreDocument) -> Self {
        let next_id = document
            .services
            .iter()
            .map(|s| s.id)
            .chain(document.apps.iter().map(|a| a.id))
            .chain(document.routes.iter().map(|r| r.id))
            .max()
            .unwrap_or(0);

        Self {
            inner: RwLock::new(Inner { document, next_id }),
        }
    }

    /// Copy of the current document.
    pub fn document(&self) -> StoreDocument {
        self.read().document.clone()
    }

    pub fn create_service(&self, mut service: Service) -> Result<Service, StoreError> {
        let mut inner = self.write();
        if inner
            .document
            .services
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(&service.name))
        {
            return Err(StoreError::Conflict("a service with the same name already exists".into()));
        }

        service.id = inner.allocate_id();
        inner.document.services.push(service.clone());
        Ok(service)
    }

    pub fn update_service(&self, id: u64, mut service: Service) -> Result<(), StoreError> {
        let mut inner = self.write();
        let slot = inner
            .document
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound { entity: "service", id })?;
        service.id = id;
        *slot = service;
        Ok(())
    }

    pub fn delete_service(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.document.routes.iter().any(|r| r.service_id == id) {
            return Err(StoreError::Conflict("remove all routes before deleting the service".into()));
        }

        let before = inner.document.services.len();
        inner.document.services.retain(|s| s.id != id);
        if inner.document.services.len() == before {
            return Err(StoreError::NotFound { entity: "service", id });
        }
        Ok(())
    }

    pub fn create_app(&self, mut app: Application) -> Result<Application, StoreError> {
        let mut inner = self.write();
        if inner
            .document
            .apps
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(&app.name))
        {
            return Err(StoreError::Conflict("an app with the same name already exists".into()));
        }

        app.id = inner.allocate_id();
        inner.document.apps.push(app.clone());
        Ok(app)
    }

    pub fn update_app(&self, id: u64, mut app: Application) -> Result<(), StoreError> {
        let mut inner = self.write();
        let slot = inner
            .document
            .apps
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { entity: "app", id })?;
        app.id = id;
        *slot = app;
        Ok(())
    }

    /// Toggle an application's active flag without touching its routes.
    pub fn set_app_active(&self, id: u64, is_active: bool) -> Result<(), StoreError> {
        let mut inner = self.write();
        let app = inner
            .document
            .apps
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { entity: "app", id })?;
        app.is_active = is_active;
        Ok(())
    }

    pub fn delete_app(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.document.routes.iter().any(|r| r.app_id == id) {
            return Err(StoreError::Conflict("remove all routes before deleting the app".into()));
        }

        let before = inner.document.apps.len();
        inner.document.apps.retain(|a| a.id != id);
        if inner.document.apps.len() == before {
            return Err(StoreError::NotFound { entity: "app", id });
        }
        Ok(())
    }

    /// Create a route, generating its credential when none is given.
    pub fn create_route(&self, mut route: Route) -> Result<Route, StoreError> {
        let mut inner = self.write();
        Self::check_references(&inner.document, &route)?;

        if route.api_key.is_empty() {
            route.api_key = generate_api_key();
        }
        Self::check_unique(&inner.document, &route, None)?;

        route.id = inner.allocate_id();
        inner.document.routes.push(route.clone());
        Ok(route)
    }

    pub fn update_route(&self, id: u64, mut route: Route) -> Result<(), StoreError> {
        let mut inner = self.write();
        Self::check_references(&inner.document, &route)?;
        Self::check_unique(&inner.document, &route, Some(id))?;

        let slot = inner
            .document
            .routes
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound { entity: "route", id })?;
        route.id = id;
        *slot = route;
        Ok(())
    }

    pub fn delete_route(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.write();
        let before = inner.document.routes.len();
        inner.document.routes.retain(|r| r.id != id);
        if inner.document.routes.len() == before {
            return Err(StoreError::NotFound { entity: "route", id });
        }
        Ok(())
    }

    fn check_references(document: &StoreDocument, route: &Route) -> Result<(), StoreError> {
        if !document.apps.iter().any(|a| a.id == route.app_id) {
            return Err(StoreError::NotFound { entity: "app", id: route.app_id });
        }
        if !document.services.iter().any(|s| s.id == route.service_id) {
            return Err(StoreError::NotFound { entity: "service", id: route.service_id });
        }
        Ok(())
    }

    fn check_unique(document: &StoreDocument, route: &Route, skip: Option<u64>) -> Result<(), StoreError> {
        for existing in document.routes.iter().filter(|r| Some(r.id) != skip) {
            if existing.app_id == route.app_id && existing.service_id == route.service_id {
                return Err(StoreError::Conflict(
                    "a route for the selected app and service already exists".into(),
                ));
            }
            if !route.api_key.is_empty() && existing.api_key.eq_ignore_ascii_case(&route.api_key) {
                return Err(StoreError::Conflict("a route with the same api key already exists".into()));
            }
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for MemoryStore {
    fn load_apps(&self) -> Result<Vec<AppSnapshot>, StoreError> {
        Ok(self.read().document.join())
    }
}
