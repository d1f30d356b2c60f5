use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::QueryService;
use crate::domain::{Account, CatalogItem, LedgerEntry};
use crate::storage::LedgerStore;

/// Point-in-time dump of the ledger for offline audit.
/// Built from independent reads, so it is not a transactional snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub catalog: Vec<CatalogItem>,
    pub entries: Vec<LedgerEntry>,
}

/// Writes ledger data out as CSV or JSON
pub struct Exporter<'a, S> {
    query: &'a QueryService<S>,
}

impl<'a, S: LedgerStore> Exporter<'a, S> {
    pub fn new(query: &'a QueryService<S>) -> Self {
        Self { query }
    }

    /// One row per ledger entry, in sequence order. Purchases have an empty
    /// `to` column and name the item bought.
    pub async fn export_entries_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.query.list_entries().await?;
        let usernames: HashMap<_, _> = self
            .query
            .list_accounts()
            .await?
            .into_iter()
            .map(|account| (account.id, account.username))
            .collect();
        let items: HashMap<_, _> = self
            .query
            .list_catalog()
            .await?
            .into_iter()
            .map(|item| (item.id, item.name))
            .collect();

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "sequence", "id", "created_at", "from", "to", "item", "amount",
        ])?;

        for entry in &entries {
            csv_writer.write_record([
                entry.sequence.to_string(),
                entry.id.to_string(),
                entry.created_at.to_rfc3339(),
                display_name(entry.from_account, &usernames),
                display_name(entry.to_account, &usernames),
                display_name(entry.item, &items),
                entry.amount.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.query.list_accounts().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["username", "balance", "initial_balance", "created_at"])?;
        for account in &accounts {
            csv_writer.write_record([
                account.username.clone(),
                account.balance.to_string(),
                account.initial_balance.to_string(),
                account.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(accounts.len())
    }

    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts: self.query.list_accounts().await?,
            catalog: self.query.list_catalog().await?,
            entries: self.query.list_entries().await?,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;

        Ok(snapshot)
    }
}

/// Name for an optional id; unknown ids fall back to the raw UUID.
fn display_name(id: Option<Uuid>, names: &HashMap<Uuid, String>) -> String {
    match id {
        Some(id) => names.get(&id).cloned().unwrap_or_else(|| id.to_string()),
        None => String::new(),
    }
}
