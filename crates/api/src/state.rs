//! Shared application state

use std::sync::Arc;

use linkvault_engine::{
    AccessGate, EntitlementService, LinkAuthorizer, LinkStore, PlanCatalog, SettlementService,
    TransactionStore,
};
use sqlx::PgPool;

use crate::{config::Config, storage::ObjectStorage};

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub storage: Arc<ObjectStorage>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let storage = Arc::new(ObjectStorage::new(&config));
        Self {
            pool,
            config: Arc::new(config),
            storage,
        }
    }

    pub fn entitlements(&self) -> EntitlementService {
        EntitlementService::new(self.pool.clone())
    }

    pub fn plans(&self) -> PlanCatalog {
        PlanCatalog::new(self.pool.clone())
    }

    pub fn links(&self) -> LinkStore {
        LinkStore::new(self.pool.clone())
    }

    pub fn gate(&self) -> AccessGate {
        AccessGate::new(self.links())
    }

    pub fn authorizer(&self) -> LinkAuthorizer {
        LinkAuthorizer::new(self.entitlements(), self.links())
    }

    pub fn settlement(&self) -> SettlementService {
        SettlementService::new(self.pool.clone())
    }

    pub fn transactions(&self) -> TransactionStore {
        TransactionStore::new(self.pool.clone())
    }
}
