use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::Coins;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Sender not found: {0}")]
    SenderNotFound(String),

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot send coins to yourself ({0})")]
    SelfTransfer(String),

    #[error("Insufficient coins for {username}: balance {balance}, required {required}")]
    InsufficientFunds {
        username: String,
        balance: Coins,
        required: Coins,
    },

    #[error("Idempotency key {0} was already used for a different transfer")]
    IdempotencyConflict(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    /// The store can no longer be trusted with writes; the process should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Store(StoreError::Poisoned))
    }

    /// A business-rule rejection as opposed to an infrastructure fault.
    /// Neither kind is retried by the services.
    pub fn is_rejection(&self) -> bool {
        match self {
            AppError::Store(err) => !err.is_infrastructure(),
            AppError::Config(_) => false,
            _ => true,
        }
    }
}

/// Translate a store `NotFound` into the caller-facing variant, pass anything else through.
pub(crate) fn or_not_found(err: StoreError, not_found: impl FnOnce() -> AppError) -> AppError {
    match err {
        StoreError::NotFound { .. } => not_found(),
        other => AppError::Store(other),
    }
}
