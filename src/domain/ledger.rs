use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Coins, ItemId};

pub type EntryId = Uuid;

/// One coin movement in the append-only audit trail.
///
/// Transfers move coins between two accounts. Purchases move coins from an
/// account to the store, so they carry no destination account and instead
/// reference the item that was bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Monotonically increasing sequence number, assigned by the store
    pub sequence: i64,
    pub from_account: Option<AccountId>,
    pub to_account: Option<AccountId>,
    pub item: Option<ItemId>,
    /// Always positive
    pub amount: Coins,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Sequence number must be assigned by the store.
    pub fn transfer(from: AccountId, to: AccountId, amount: Coins) -> Self {
        assert!(amount > 0, "Ledger amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            from_account: Some(from),
            to_account: Some(to),
            item: None,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn purchase(buyer: AccountId, item: ItemId, price: Coins) -> Self {
        assert!(price > 0, "Ledger amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            from_account: Some(buyer),
            to_account: None,
            item: Some(item),
            amount: price,
            created_at: Utc::now(),
        }
    }

    pub fn is_purchase(&self) -> bool {
        self.to_account.is_none()
    }
}

/// Which side of a ledger entry an account is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A transfer as seen from one account: who was on the other side and how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinMovement {
    /// Username on the other side of the transfer
    #[serde(rename = "username")]
    pub counterparty: String,
    pub amount: Coins,
}

/// Aggregates the store computes over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub account_count: i64,
    pub entry_count: i64,
    pub total_balance: Coins,
    pub total_granted: Coins,
    pub total_spent: Coins,
    pub negative_balances: i64,
    pub invalid_amounts: i64,
    pub has_sequence_gaps: bool,
}

/// Result of checking the ledger against its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub entry_count: i64,
    pub total_balance: Coins,
    pub total_granted: Coins,
    pub total_spent: Coins,
    /// Balances plus coins spent on merch equal the coins ever granted
    pub is_balanced: bool,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.is_balanced && self.issues.is_empty()
    }
}

/// Check ledger totals against the conservation law and the sign invariants.
pub fn build_integrity_report(totals: &LedgerTotals) -> IntegrityReport {
    let is_balanced = totals.total_balance + totals.total_spent == totals.total_granted;
    let mut issues = Vec::new();

    if !is_balanced {
        issues.push(format!(
            "Coins are not conserved: balances {} + spent {} != granted {}",
            totals.total_balance, totals.total_spent, totals.total_granted
        ));
    }
    if totals.negative_balances > 0 {
        issues.push(format!(
            "{} account(s) have a negative balance",
            totals.negative_balances
        ));
    }
    if totals.invalid_amounts > 0 {
        issues.push(format!(
            "{} ledger entr(ies) have a non-positive amount",
            totals.invalid_amounts
        ));
    }
    if totals.has_sequence_gaps {
        issues.push("Ledger sequence numbers have gaps".to_string());
    }

    IntegrityReport {
        account_count: totals.account_count,
        entry_count: totals.entry_count,
        total_balance: totals.total_balance,
        total_granted: totals.total_granted,
        total_spent: totals.total_spent,
        is_balanced,
        issues,
    }
}
