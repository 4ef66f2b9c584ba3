use std::sync::Arc;

use boxoffice_catalog::CatalogService;
use boxoffice_core::{IdentityService, TransactionalStore};
use boxoffice_reservation::ReservationManager;

#[derive(Clone)]
pub struct AppState {
    /// Handlers that span several service calls open their own transaction here.
    pub store: Arc<dyn TransactionalStore>,
    pub identity: IdentityService,
    pub catalog: CatalogService,
    pub reservations: ReservationManager,
}

impl AppState {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self {
            identity: IdentityService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            reservations: ReservationManager::new(store.clone()),
            store,
        }
    }
}
