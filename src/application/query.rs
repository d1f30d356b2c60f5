use std::sync::Arc;

use serde::Serialize;

use crate::domain::{
    build_integrity_report, normalize_username, Account, CatalogItem, CoinMovement, Coins,
    Direction, Holding, IntegrityReport, LedgerEntry,
};
use crate::storage::LedgerStore;

use super::error::or_not_found;
use super::AppError;

/// Read-only projections over the ledger.
///
/// Each read is independent; a summary is assembled from several reads that
/// are not taken from a single snapshot.
pub struct QueryService<S> {
    store: Arc<S>,
}

/// What a user sees about themselves: balance, inventory and transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub coins: Coins,
    pub inventory: Vec<Holding>,
    pub coin_history: CoinHistory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoinHistory {
    pub received: Vec<CoinMovement>,
    pub sent: Vec<CoinMovement>,
}

impl<S> Clone for QueryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> QueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get_summary(&self, username: &str) -> Result<Summary, AppError> {
        let account = self.get_account(username).await?;

        let inventory = self.store.list_holdings(account.id).await?;
        let received = self
            .store
            .list_ledger_entries(account.id, Direction::Incoming)
            .await?;
        let sent = self
            .store
            .list_ledger_entries(account.id, Direction::Outgoing)
            .await?;

        Ok(Summary {
            coins: account.balance,
            inventory,
            coin_history: CoinHistory { received, sent },
        })
    }

    pub async fn get_balance(&self, username: &str) -> Result<Coins, AppError> {
        Ok(self.get_account(username).await?.balance)
    }

    pub async fn get_account(&self, username: &str) -> Result<Account, AppError> {
        let username = normalize_username(username)
            .ok_or_else(|| AppError::InvalidUsername(username.to_string()))?;
        self.store.get_account(username).await.map_err(|err| {
            or_not_found(err, || AppError::AccountNotFound(username.to_string()))
        })
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.store.list_accounts().await?)
    }

    pub async fn list_catalog(&self) -> Result<Vec<CatalogItem>, AppError> {
        Ok(self.store.list_catalog().await?)
    }

    /// The full audit trail in sequence order.
    pub async fn list_entries(&self) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self.store.list_all_entries().await?)
    }

    /// Check the conservation law and the sign invariants over the whole ledger.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let totals = self.store.ledger_totals().await?;
        Ok(build_integrity_report(&totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLedgerStore;

    #[tokio::test]
    async fn test_summary_of_missing_account() {
        let service = QueryService::new(Arc::new(MemoryLedgerStore::new()));
        let result = service.get_summary("nobody").await;
        assert!(matches!(result, Err(AppError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_fresh_account_summary() {
        let store = Arc::new(MemoryLedgerStore::new());
        store.create_account("alice", 1000).await.unwrap();
        let service = QueryService::new(store);

        let summary = service.get_summary("alice").await.unwrap();
        assert_eq!(summary.coins, 1000);
        assert!(summary.inventory.is_empty());
        assert_eq!(summary.coin_history, CoinHistory::default());
    }

    #[test]
    fn test_summary_serializes_with_wire_names() {
        let summary = Summary {
            coins: 920,
            inventory: vec![Holding {
                item: "t-shirt".to_string(),
                quantity: 1,
            }],
            coin_history: CoinHistory {
                received: vec![CoinMovement {
                    counterparty: "bob".to_string(),
                    amount: 30,
                }],
                sent: vec![],
            },
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["coins"], 920);
        assert_eq!(json["inventory"][0]["type"], "t-shirt");
        assert_eq!(json["coinHistory"]["received"][0]["username"], "bob");
        assert_eq!(json["coinHistory"]["received"][0]["amount"], 30);
        assert!(json["coinHistory"]["sent"].as_array().unwrap().is_empty());
    }
}
