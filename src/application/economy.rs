use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{
    normalize_username, Account, CatalogItem, Coins, IdempotencyKey, LedgerEntry,
};
use crate::storage::{LedgerStore, StoreError};

use super::error::or_not_found;
use super::AppError;

/// Business rules for every operation that moves coins.
///
/// Each operation resolves identities, validates preconditions and then
/// issues exactly one atomic store mutation. Nothing is retried: a failed
/// mutation is reported to the caller as-is.
pub struct EconomyService<S> {
    store: Arc<S>,
    initial_balance: Coins,
}

/// Result of opening (or re-opening) an account
#[derive(Debug, Clone)]
pub struct AccountOpening {
    pub account: Account,
    /// False when the username already existed
    pub created: bool,
}

/// Result of a coin transfer
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub entry: LedgerEntry,
    pub from_username: String,
    pub to_username: String,
    /// The idempotency key matched an earlier transfer; nothing new was applied
    pub replayed: bool,
}

/// Result of buying one item
#[derive(Debug, Clone)]
pub struct PurchaseResult {
    pub entry: LedgerEntry,
    pub username: String,
    pub item: CatalogItem,
}

impl<S> Clone for EconomyService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            initial_balance: self.initial_balance,
        }
    }
}

impl<S: LedgerStore> EconomyService<S> {
    pub fn new(store: Arc<S>, initial_balance: Coins) -> Self {
        Self {
            store,
            initial_balance,
        }
    }

    pub fn initial_balance(&self) -> Coins {
        self.initial_balance
    }

    // ========================
    // Accounts
    // ========================

    /// Return the account for `username`, creating it with the initial grant
    /// if it does not exist yet.
    pub async fn open_account(&self, username: &str) -> Result<AccountOpening, AppError> {
        let username = normalize_username(username)
            .ok_or_else(|| AppError::InvalidUsername(username.to_string()))?;

        match self.store.get_account(username).await {
            Ok(account) => {
                return Ok(AccountOpening {
                    account,
                    created: false,
                });
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        match self
            .store
            .create_account(username, self.initial_balance)
            .await
        {
            Ok(account) => {
                info!(username, balance = account.balance, "Opened account");
                Ok(AccountOpening {
                    account,
                    created: true,
                })
            }
            // Lost a creation race; the winner's row is the account.
            Err(StoreError::AlreadyExists { .. }) => {
                let account = self.store.get_account(username).await?;
                Ok(AccountOpening {
                    account,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create a new account, failing if the username is taken.
    pub async fn create_account(&self, username: &str) -> Result<Account, AppError> {
        let username = normalize_username(username)
            .ok_or_else(|| AppError::InvalidUsername(username.to_string()))?;

        let account = self
            .store
            .create_account(username, self.initial_balance)
            .await
            .map_err(|err| match err {
                StoreError::AlreadyExists { .. } => {
                    AppError::AccountAlreadyExists(username.to_string())
                }
                other => other.into(),
            })?;

        info!(username, balance = account.balance, "Opened account");
        Ok(account)
    }

    // ========================
    // Transfers
    // ========================

    /// Move `amount` coins from one user to another.
    ///
    /// Calling this twice applies the transfer twice. Callers that may retry
    /// should use [`EconomyService::send_coins_with_key`].
    pub async fn send_coins(
        &self,
        from: &str,
        to: &str,
        amount: Coins,
    ) -> Result<TransferResult, AppError> {
        self.transfer(from, to, amount, None).await
    }

    /// Move coins at most once per `key`. Repeating the call with the same key
    /// and the same request returns the original entry without moving coins
    /// again; reusing the key for a different request is rejected.
    pub async fn send_coins_with_key(
        &self,
        from: &str,
        to: &str,
        amount: Coins,
        key: IdempotencyKey,
    ) -> Result<TransferResult, AppError> {
        self.transfer(from, to, amount, Some(key)).await
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Coins,
        key: Option<IdempotencyKey>,
    ) -> Result<TransferResult, AppError> {
        if amount <= 0 {
            warn!(from, to, amount, "Rejected transfer with non-positive amount");
            return Err(AppError::InvalidAmount(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }

        let from = normalize_username(from)
            .ok_or_else(|| AppError::InvalidUsername(from.to_string()))?;
        let to =
            normalize_username(to).ok_or_else(|| AppError::InvalidUsername(to.to_string()))?;

        if from == to {
            warn!(username = from, amount, "Rejected transfer to self");
            return Err(AppError::SelfTransfer(from.to_string()));
        }

        let sender = self
            .store
            .get_account(from)
            .await
            .map_err(|err| or_not_found(err, || AppError::SenderNotFound(from.to_string())))?;
        let recipient = self.store.get_account(to).await.map_err(|err| {
            or_not_found(err, || AppError::RecipientNotFound(to.to_string()))
        })?;

        let receipt = self
            .store
            .atomic_transfer(sender.id, recipient.id, amount, key)
            .await
            .map_err(|err| match err {
                StoreError::InsufficientFunds { balance, required } => {
                    warn!(from, to, balance, required, "Rejected transfer: insufficient coins");
                    AppError::InsufficientFunds {
                        username: from.to_string(),
                        balance,
                        required,
                    }
                }
                StoreError::IdempotencyConflict(key) => {
                    warn!(from, to, amount, %key, "Rejected transfer: idempotency key reused");
                    AppError::IdempotencyConflict(key)
                }
                other => other.into(),
            })?;

        if receipt.replayed {
            info!(
                from,
                to,
                amount,
                sequence = receipt.entry.sequence,
                "Transfer already applied, returning original entry"
            );
        } else {
            info!(
                from,
                to,
                amount,
                sequence = receipt.entry.sequence,
                "Sent coins"
            );
        }

        Ok(TransferResult {
            entry: receipt.entry,
            from_username: sender.username,
            to_username: recipient.username,
            replayed: receipt.replayed,
        })
    }

    // ========================
    // Purchases
    // ========================

    /// Buy one unit of a catalog item at its current price.
    pub async fn buy_item(
        &self,
        username: &str,
        item_name: &str,
    ) -> Result<PurchaseResult, AppError> {
        let username = normalize_username(username)
            .ok_or_else(|| AppError::InvalidUsername(username.to_string()))?;

        let account = self.store.get_account(username).await.map_err(|err| {
            or_not_found(err, || AppError::AccountNotFound(username.to_string()))
        })?;
        let item = self
            .store
            .get_catalog_item(item_name)
            .await
            .map_err(|err| or_not_found(err, || AppError::ItemNotFound(item_name.to_string())))?;

        // Fast path only; the store's conditional debit is authoritative.
        if !account.can_afford(item.price) {
            warn!(
                username,
                item = %item.name,
                balance = account.balance,
                price = item.price,
                "Rejected purchase: insufficient coins"
            );
            return Err(AppError::InsufficientFunds {
                username: username.to_string(),
                balance: account.balance,
                required: item.price,
            });
        }

        let entry = self
            .store
            .atomic_purchase(account.id, item.id, item.price)
            .await
            .map_err(|err| match err {
                StoreError::InsufficientFunds { balance, required } => {
                    warn!(username, item = %item.name, balance, required, "Rejected purchase: insufficient coins");
                    AppError::InsufficientFunds {
                        username: username.to_string(),
                        balance,
                        required,
                    }
                }
                other => other.into(),
            })?;

        info!(
            username,
            item = %item.name,
            price = item.price,
            sequence = entry.sequence,
            "Bought item"
        );

        Ok(PurchaseResult {
            entry,
            username: account.username,
            item,
        })
    }
}
