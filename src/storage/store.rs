use async_trait::async_trait;

use crate::domain::{
    Account, AccountId, CatalogItem, CatalogSeed, CoinMovement, Coins, Direction, Holding,
    IdempotencyKey, ItemId, LedgerEntry, LedgerTotals,
};

use super::StoreError;

/// Outcome of an atomic transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub entry: LedgerEntry,
    /// The idempotency key had already been used for this exact transfer;
    /// nothing was applied and `entry` is the original record.
    pub replayed: bool,
}

/// Durable ledger state: accounts, catalog, holdings and the transaction log.
///
/// Every mutation is a single atomic unit. Balance sufficiency is checked
/// inside that unit, so concurrent spends against one account can never
/// both succeed when only one could be honored. Implementations never retry.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `AlreadyExists` if the username is taken.
    async fn create_account(
        &self,
        username: &str,
        initial_balance: Coins,
    ) -> Result<Account, StoreError>;

    async fn get_account(&self, username: &str) -> Result<Account, StoreError>;

    /// All accounts, ordered by username.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn get_catalog_item(&self, name: &str) -> Result<CatalogItem, StoreError>;

    /// All catalog items, cheapest first.
    async fn list_catalog(&self) -> Result<Vec<CatalogItem>, StoreError>;

    /// Insert items whose name is not present yet. Returns how many were added.
    async fn seed_catalog(&self, items: &[CatalogSeed]) -> Result<usize, StoreError>;

    /// Debit `from`, credit `to`, append one ledger entry; all or nothing.
    async fn atomic_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Coins,
        key: Option<IdempotencyKey>,
    ) -> Result<TransferReceipt, StoreError>;

    /// Debit the buyer, add one unit to their holding, append one ledger entry.
    async fn atomic_purchase(
        &self,
        account: AccountId,
        item: ItemId,
        price: Coins,
    ) -> Result<LedgerEntry, StoreError>;

    async fn list_holdings(&self, account: AccountId) -> Result<Vec<Holding>, StoreError>;

    /// Account-to-account movements on one side of `account`, oldest first.
    /// Purchases have no counterparty and are not included.
    async fn list_ledger_entries(
        &self,
        account: AccountId,
        direction: Direction,
    ) -> Result<Vec<CoinMovement>, StoreError>;

    /// The whole audit trail, in sequence order.
    async fn list_all_entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn ledger_totals(&self) -> Result<LedgerTotals, StoreError>;
}
