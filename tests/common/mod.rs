// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use merchcoin::application::Ledger;
use merchcoin::config::{Config, DatabaseConfig};
use merchcoin::domain::{Account, CatalogSeed, Coins, default_catalog};
use merchcoin::storage::{LedgerStore, MemoryLedgerStore, Repository};
use tempfile::TempDir;

/// Config pointing at a fresh database file inside `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        database: DatabaseConfig::new(dir.path().join("test.db")).max_connections(8),
        ..Config::default()
    }
}

/// SQLite-backed ledger in a temporary directory, catalog seeded with the defaults.
pub async fn test_ledger() -> Result<(Ledger<Repository>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let ledger = Ledger::open(&test_config(&temp_dir)).await?;
    Ok((ledger, temp_dir))
}

/// Bare repository (migrated, catalog not seeded).
pub async fn test_repository() -> Result<(Repository, TempDir)> {
    let temp_dir = TempDir::new()?;
    let repo = Repository::init(&test_config(&temp_dir).database).await?;
    Ok((repo, temp_dir))
}

/// In-memory ledger with the default catalog.
pub async fn memory_ledger() -> Result<Ledger<MemoryLedgerStore>> {
    let store = Arc::new(MemoryLedgerStore::new());
    store.seed_catalog(&default_catalog()).await?;
    Ok(Ledger::new(store, Config::default().initial_balance))
}

/// Test fixture: accounts with balances other than the standard grant
pub struct Users;

impl Users {
    /// Create an account whose initial grant is `balance`.
    pub async fn with_balance<S: LedgerStore>(
        ledger: &Ledger<S>,
        username: &str,
        balance: Coins,
    ) -> Result<Account> {
        Ok(ledger.store().create_account(username, balance).await?)
    }

    /// alice (100) and bob (50)
    pub async fn alice_and_bob<S: LedgerStore>(ledger: &Ledger<S>) -> Result<()> {
        Self::with_balance(ledger, "alice", 100).await?;
        Self::with_balance(ledger, "bob", 50).await?;
        Ok(())
    }
}

pub fn sticker_catalog() -> Vec<CatalogSeed> {
    vec![CatalogSeed::new("sticker", 5), CatalogSeed::new("mug", 25)]
}

/// Panics unless the ledger passes its integrity check.
pub async fn assert_consistent<S: LedgerStore>(ledger: &Ledger<S>) -> Result<()> {
    let report = ledger.query.check_integrity().await?;
    assert!(report.is_healthy(), "ledger unhealthy: {:?}", report.issues);
    Ok(())
}
