use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::domain::Coins;
use crate::storage::{LedgerStore, Repository};

use super::{AppError, EconomyService, QueryService};

/// Both services wired to one shared store.
/// This is the entry point for any front end (CLI, HTTP handler, tests).
pub struct Ledger<S> {
    store: Arc<S>,
    pub economy: EconomyService<S>,
    pub query: QueryService<S>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, initial_balance: Coins) -> Self {
        Self {
            economy: EconomyService::new(Arc::clone(&store), initial_balance),
            query: QueryService::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl Ledger<Repository> {
    /// Open (creating if needed) the SQLite ledger described by `config`,
    /// apply migrations and seed the catalog.
    pub async fn open(config: &Config) -> Result<Self, AppError> {
        config.validate()?;

        let repo = Repository::init(&config.database).await?;
        let added = repo.seed_catalog(&config.catalog).await?;
        info!(
            path = %config.database.path.display(),
            added,
            "Ledger ready"
        );
        Ok(Self::new(Arc::new(repo), config.initial_balance))
    }
}
