use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Account, AccountId, CatalogItem, CatalogSeed, CoinMovement, Coins, Direction, EntryId,
    Holding, IdempotencyKey, ItemId, LedgerEntry, LedgerTotals,
};

use super::{LedgerStore, StoreError, TransferReceipt};

#[derive(Debug, Clone, Copy)]
struct KeyRecord {
    from: AccountId,
    to: AccountId,
    amount: Coins,
    entry: EntryId,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    usernames: HashMap<String, AccountId>,
    catalog: HashMap<String, CatalogItem>,
    holdings: HashMap<(AccountId, ItemId), i64>,
    entries: Vec<LedgerEntry>,
    keys: HashMap<IdempotencyKey, KeyRecord>,
}

impl State {
    fn account(&self, id: AccountId) -> Result<&Account, StoreError> {
        self.accounts
            .get(&id)
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    fn username(&self, id: Option<AccountId>) -> Option<&str> {
        id.and_then(|id| self.accounts.get(&id))
            .map(|account| account.username.as_str())
    }

    /// Checked before anything is written, so a rejected debit changes nothing.
    fn check_funds(&self, id: AccountId, amount: Coins) -> Result<(), StoreError> {
        let balance = self.account(id)?.balance;
        if balance < amount {
            return Err(StoreError::InsufficientFunds {
                balance,
                required: amount,
            });
        }
        Ok(())
    }

    fn append(&mut self, mut entry: LedgerEntry) -> LedgerEntry {
        entry.sequence = self.entries.len() as i64 + 1;
        self.entries.push(entry.clone());
        entry
    }
}

/// In-memory ledger store with the same contract as the SQLite repository.
///
/// A single mutex serializes every operation. Meant for exercising the
/// services without a database; `fail_writes` simulates an outage and
/// `poison` a failed rollback.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    poisoned: AtomicBool,
    mutation_attempts: AtomicUsize,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mutation fail with `Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Behave as if a rollback had failed: every later mutation is refused
    /// with `Poisoned` while reads keep working.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// How many mutations were attempted, including failed ones.
    pub fn mutation_attempts(&self) -> usize {
        self.mutation_attempts.load(Ordering::SeqCst)
    }

    fn begin_mutation(&self) -> Result<(), StoreError> {
        self.mutation_attempts.fetch_add(1, Ordering::SeqCst);
        if self.is_poisoned() {
            return Err(StoreError::Poisoned);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_account(
        &self,
        username: &str,
        initial_balance: Coins,
    ) -> Result<Account, StoreError> {
        self.begin_mutation()?;
        if initial_balance < 0 {
            return Err(StoreError::InvalidAmount(initial_balance));
        }

        let mut state = self.state.lock().await;
        if state.usernames.contains_key(username) {
            return Err(StoreError::already_exists("account", username));
        }

        let account = Account::new(username, initial_balance);
        state.usernames.insert(account.username.clone(), account.id);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, username: &str) -> Result<Account, StoreError> {
        let state = self.state.lock().await;
        let id = state
            .usernames
            .get(username)
            .ok_or_else(|| StoreError::not_found("account", username))?;
        state.account(*id).cloned()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }

    async fn get_catalog_item(&self, name: &str) -> Result<CatalogItem, StoreError> {
        let state = self.state.lock().await;
        state
            .catalog
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("item", name))
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<CatalogItem> = state.catalog.values().cloned().collect();
        items.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    async fn seed_catalog(&self, items: &[CatalogSeed]) -> Result<usize, StoreError> {
        self.begin_mutation()?;
        if let Some(bad) = items.iter().find(|seed| seed.price <= 0) {
            return Err(StoreError::InvalidAmount(bad.price));
        }

        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for seed in items {
            if !state.catalog.contains_key(&seed.name) {
                let item = CatalogItem::new(seed.name.clone(), seed.price);
                state.catalog.insert(item.name.clone(), item);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn atomic_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Coins,
        key: Option<IdempotencyKey>,
    ) -> Result<TransferReceipt, StoreError> {
        self.begin_mutation()?;
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;

        if let Some(key) = key {
            if let Some(record) = state.keys.get(&key).copied() {
                if record.from != from || record.to != to || record.amount != amount {
                    return Err(StoreError::IdempotencyConflict(key.to_string()));
                }
                let original = state
                    .entries
                    .iter()
                    .find(|entry| entry.id == record.entry)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!("missing entry {}", record.entry))
                    })?;
                return Ok(TransferReceipt {
                    entry: original,
                    replayed: true,
                });
            }
        }

        state.check_funds(from, amount)?;
        state.account(to)?;

        state.account_mut(from)?.balance -= amount;
        state.account_mut(to)?.balance += amount;
        let entry = state.append(LedgerEntry::transfer(from, to, amount));

        if let Some(key) = key {
            state.keys.insert(
                key,
                KeyRecord {
                    from,
                    to,
                    amount,
                    entry: entry.id,
                },
            );
        }

        Ok(TransferReceipt {
            entry,
            replayed: false,
        })
    }

    async fn atomic_purchase(
        &self,
        account: AccountId,
        item: ItemId,
        price: Coins,
    ) -> Result<LedgerEntry, StoreError> {
        self.begin_mutation()?;
        if price <= 0 {
            return Err(StoreError::InvalidAmount(price));
        }

        let mut state = self.state.lock().await;
        if !state.catalog.values().any(|c| c.id == item) {
            return Err(StoreError::not_found("item", item));
        }
        state.check_funds(account, price)?;

        state.account_mut(account)?.balance -= price;
        *state.holdings.entry((account, item)).or_insert(0) += 1;
        Ok(state.append(LedgerEntry::purchase(account, item, price)))
    }

    async fn list_holdings(&self, account: AccountId) -> Result<Vec<Holding>, StoreError> {
        let state = self.state.lock().await;
        let mut holdings: Vec<Holding> = state
            .catalog
            .values()
            .filter_map(|item| {
                state
                    .holdings
                    .get(&(account, item.id))
                    .map(|quantity| Holding {
                        item: item.name.clone(),
                        quantity: *quantity,
                    })
            })
            .collect();
        holdings.sort_by(|a, b| a.item.cmp(&b.item));
        Ok(holdings)
    }

    async fn list_ledger_entries(
        &self,
        account: AccountId,
        direction: Direction,
    ) -> Result<Vec<CoinMovement>, StoreError> {
        let state = self.state.lock().await;
        let movements = state
            .entries
            .iter()
            .filter_map(|entry| {
                let (own_side, other_side) = match direction {
                    Direction::Incoming => (entry.to_account, entry.from_account),
                    Direction::Outgoing => (entry.from_account, entry.to_account),
                };
                if own_side != Some(account) {
                    return None;
                }
                state.username(other_side).map(|name| CoinMovement {
                    counterparty: name.to_string(),
                    amount: entry.amount,
                })
            })
            .collect();
        Ok(movements)
    }

    async fn list_all_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.entries.clone())
    }

    async fn ledger_totals(&self) -> Result<LedgerTotals, StoreError> {
        let state = self.state.lock().await;
        Ok(LedgerTotals {
            account_count: state.accounts.len() as i64,
            entry_count: state.entries.len() as i64,
            total_balance: state.accounts.values().map(|a| a.balance).sum(),
            total_granted: state.accounts.values().map(|a| a.initial_balance).sum(),
            total_spent: state
                .entries
                .iter()
                .filter(|e| e.is_purchase())
                .map(|e| e.amount)
                .sum(),
            negative_balances: state.accounts.values().filter(|a| a.balance < 0).count() as i64,
            invalid_amounts: state.entries.iter().filter(|e| e.amount <= 0).count() as i64,
            has_sequence_gaps: false,
        })
    }
}
