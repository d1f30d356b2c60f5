use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Coins;

pub type AccountId = Uuid;

/// Coins granted to every account when it is first opened.
pub const INITIAL_BALANCE: Coins = 1000;

/// A user's coin-holding identity. The username never changes once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub balance: Coins,
    /// Grant the account was opened with, kept for the conservation check
    pub initial_balance: Coins,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, initial_balance: Coins) -> Self {
        assert!(initial_balance >= 0, "Initial balance cannot be negative");
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            balance: initial_balance,
            initial_balance,
            created_at: Utc::now(),
        }
    }

    pub fn can_afford(&self, amount: Coins) -> bool {
        self.balance >= amount
    }
}

/// Normalize a username handed over by the request layer.
/// Returns `None` for blank input.
pub fn normalize_username(username: &str) -> Option<&str> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
