use thiserror::Error;

use crate::domain::Coins;

/// Errors raised by ledger store implementations.
///
/// Business outcomes (`NotFound`, `AlreadyExists`, `InsufficientFunds`,
/// `IdempotencyConflict`) are kept apart from infrastructure faults so the
/// application layer can translate the former and pass the latter through.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Coins, required: Coins },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Coins),

    #[error("Idempotency key {0} was already used for a different transfer")]
    IdempotencyConflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// A rollback failed earlier; the store refuses writes until restarted.
    #[error("Store is poisoned after a failed rollback; writes are disabled")]
    Poisoned,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn already_exists(entity: &'static str, key: impl ToString) -> Self {
        StoreError::AlreadyExists {
            entity,
            key: key.to_string(),
        }
    }

    /// True for faults of the storage itself rather than business outcomes.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_)
                | StoreError::CommitFailed(_)
                | StoreError::Poisoned
                | StoreError::Query(_)
                | StoreError::Corrupt(_)
        )
    }
}

/// sqlx::Error::PoolTimedOut / PoolClosed / Io  -> Unavailable
/// SQLITE_BUSY ("database is locked")            -> Unavailable
/// anything else                                 -> Query
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.message().contains("database is locked") => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}
