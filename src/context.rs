use std::sync::Arc;

use crate::backend::{IdentityProvider, LocalIdentityProvider, MemoryStore, RecordStore};
use crate::config::Config;
use crate::services::{AuthService, MedicationService};
use crate::session::SessionStore;

/// Everything a page needs, built once at startup and shared by reference.
#[derive(Clone)]
pub struct AppContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn RecordStore>,
    pub session: Arc<SessionStore>,
    pub auth: Arc<AuthService>,
    pub medications: Arc<MedicationService>,
}

impl AppContext {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn RecordStore>) -> Self {
        let session = Arc::new(SessionStore::new(identity.as_ref()));
        let auth = Arc::new(AuthService::new(
            identity.clone(),
            store.clone(),
            session.clone(),
        ));
        let medications = Arc::new(MedicationService::new(store.clone()));
        Self {
            identity,
            store,
            session,
            auth,
            medications,
        }
    }

    /// Backed by the in-process identity provider and record store.
    pub fn local(config: &Config) -> Self {
        let identity = Arc::new(LocalIdentityProvider::new(
            config.jwt_secret.clone(),
            config.session_ttl_hours,
            config.bcrypt_cost,
        ));
        Self::new(identity, Arc::new(MemoryStore::new()))
    }
}
