use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::{
    Account, AccountId, CatalogItem, CatalogSeed, CoinMovement, Coins, Direction, EntryId,
    Holding, IdempotencyKey, ItemId, LedgerEntry, LedgerTotals,
};

use super::{LedgerStore, MIGRATION_001_INITIAL, StoreError, TransferReceipt};

const ENTRY_COLUMNS: &str =
    "id, sequence, from_account_id, to_account_id, item_id, amount, created_at";

/// SQLite-backed ledger store.
///
/// Each atomic operation checks out one pooled connection, runs inside a
/// single transaction and releases the connection on commit or rollback.
/// The first statement of every mutation is a write, so the database write
/// lock is held before any balance is examined.
pub struct Repository {
    pool: SqlitePool,
    poisoned: AtomicBool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Open (creating if needed) the SQLite database described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(path = %config.path.display(), "Opening ledger database");

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!(
                    "Failed to open {}: {}",
                    config.path.display(),
                    e
                ))
            })?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await?;
        info!("Ledger schema is up to date");
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// The underlying pool, for maintenance statements not covered here.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub async fn close(&self) {
        info!("Closing ledger database");
        self.pool.close().await;
    }

    /// Refuse every later mutation. Reads keep working.
    pub(crate) fn mark_poisoned(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.is_poisoned() {
            return Err(StoreError::Poisoned);
        }
        Ok(())
    }

    /// Commit on success, roll back on failure.
    ///
    /// A failed rollback leaves the ledger in an unknown state, so the store
    /// stops accepting mutations from then on.
    async fn finish<T>(
        &self,
        tx: Transaction<'static, Sqlite>,
        outcome: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match outcome {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::CommitFailed(e.to_string()))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    self.mark_poisoned();
                    error!(
                        cause = %err,
                        rollback_error = %rollback_err,
                        "Rollback failed; ledger writes disabled until restart"
                    );
                    return Err(StoreError::Poisoned);
                }
                Err(err)
            }
        }
    }

    // ========================
    // Statements run inside a transaction
    // ========================

    /// Conditional debit: succeeds only if the balance covers `amount`.
    async fn debit(
        conn: &mut SqliteConnection,
        account: AccountId,
        amount: Coins,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET balance = balance - ? WHERE id = ? AND balance >= ?",
        )
        .bind(amount)
        .bind(account.to_string())
        .bind(amount)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let balance: Option<Coins> = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = ?")
            .bind(account.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        match balance {
            Some(balance) => Err(StoreError::InsufficientFunds {
                balance,
                required: amount,
            }),
            None => Err(StoreError::not_found("account", account)),
        }
    }

    async fn credit(
        conn: &mut SqliteConnection,
        account: AccountId,
        amount: Coins,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
            .bind(amount)
            .bind(account.to_string())
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("account", account));
        }
        Ok(())
    }

    async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'ledger_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *conn)
        .await?;
        Ok(value)
    }

    /// Assigns the next sequence number and inserts the entry.
    async fn append_entry(
        conn: &mut SqliteConnection,
        entry: &mut LedgerEntry,
    ) -> Result<(), StoreError> {
        entry.sequence = Self::next_sequence(conn).await?;
        Self::insert_entry(conn, entry).await
    }

    /// Inserts an entry whose sequence number is already assigned.
    async fn insert_entry(
        conn: &mut SqliteConnection,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, sequence, from_account_id, to_account_id, item_id, amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(entry.from_account.map(|id| id.to_string()))
        .bind(entry.to_account.map(|id| id.to_string()))
        .bind(entry.item.map(|id| id.to_string()))
        .bind(entry.amount)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        debug!(sequence = entry.sequence, amount = entry.amount, "Ledger entry appended");
        Ok(())
    }

    /// Returns false if the key is already taken.
    async fn claim_key(
        conn: &mut SqliteConnection,
        key: IdempotencyKey,
        from: AccountId,
        to: AccountId,
        amount: Coins,
        entry_id: EntryId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, from_account_id, to_account_id, amount, entry_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key.to_string())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(amount)
        .bind(entry_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Look up the entry an already-used key produced.
    async fn replay(
        conn: &mut SqliteConnection,
        key: IdempotencyKey,
        from: AccountId,
        to: AccountId,
        amount: Coins,
    ) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query(
            "SELECT from_account_id, to_account_id, amount, entry_id FROM idempotency_keys WHERE key = ?",
        )
        .bind(key.to_string())
        .fetch_one(&mut *conn)
        .await?;

        let same_request = parse_id(&row.try_get::<String, _>("from_account_id")?)? == from
            && parse_id(&row.try_get::<String, _>("to_account_id")?)? == to
            && row.try_get::<Coins, _>("amount")? == amount;
        if !same_request {
            return Err(StoreError::IdempotencyConflict(key.to_string()));
        }

        let entry_id: String = row.try_get("entry_id")?;
        let entry = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?"
        ))
        .bind(&entry_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            StoreError::Corrupt(format!("idempotency key {key} points at missing entry {entry_id}"))
        })?;

        row_to_entry(&entry)
    }

    async fn transfer_in_tx(
        conn: &mut SqliteConnection,
        from: AccountId,
        to: AccountId,
        amount: Coins,
        key: Option<IdempotencyKey>,
    ) -> Result<TransferReceipt, StoreError> {
        let mut entry = LedgerEntry::transfer(from, to, amount);

        if let Some(key) = key {
            if !Self::claim_key(conn, key, from, to, amount, entry.id).await? {
                let original = Self::replay(conn, key, from, to, amount).await?;
                debug!(%key, sequence = original.sequence, "Transfer replayed from idempotency key");
                return Ok(TransferReceipt {
                    entry: original,
                    replayed: true,
                });
            }
        }

        Self::debit(conn, from, amount).await?;
        Self::credit(conn, to, amount).await?;
        Self::append_entry(conn, &mut entry).await?;

        Ok(TransferReceipt {
            entry,
            replayed: false,
        })
    }

    async fn purchase_in_tx(
        conn: &mut SqliteConnection,
        account: AccountId,
        item: ItemId,
        price: Coins,
    ) -> Result<LedgerEntry, StoreError> {
        // Taking the sequence number first grabs the write lock, so the item
        // lookup below reads the latest committed state.
        let mut entry = LedgerEntry::purchase(account, item, price);
        entry.sequence = Self::next_sequence(conn).await?;

        let known: Option<String> =
            sqlx::query_scalar("SELECT id FROM catalog_items WHERE id = ?")
                .bind(item.to_string())
                .fetch_optional(&mut *conn)
                .await?;
        if known.is_none() {
            return Err(StoreError::not_found("item", item));
        }

        Self::debit(conn, account, price).await?;

        sqlx::query(
            r#"
            INSERT INTO holdings (account_id, item_id, quantity)
            VALUES (?, ?, 1)
            ON CONFLICT(account_id, item_id) DO UPDATE SET quantity = quantity + 1
            "#,
        )
        .bind(account.to_string())
        .bind(item.to_string())
        .execute(&mut *conn)
        .await?;

        Self::insert_entry(conn, &entry).await?;
        Ok(entry)
    }

    async fn seed_in_tx(
        conn: &mut SqliteConnection,
        items: &[CatalogSeed],
    ) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for seed in items {
            let item = CatalogItem::new(seed.name.clone(), seed.price);
            let result = sqlx::query(
                "INSERT INTO catalog_items (id, name, price) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
            )
            .bind(item.id.to_string())
            .bind(&item.name)
            .bind(item.price)
            .execute(&mut *conn)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn create_account(
        &self,
        username: &str,
        initial_balance: Coins,
    ) -> Result<Account, StoreError> {
        self.ensure_writable()?;
        if initial_balance < 0 {
            return Err(StoreError::InvalidAmount(initial_balance));
        }
        let account = Account::new(username, initial_balance);

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, username, balance, initial_balance, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.username)
        .bind(account.balance)
        .bind(account.initial_balance)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(username = %account.username, "Account row inserted");
                Ok(account)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::already_exists("account", username))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_account(&self, username: &str) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, balance, initial_balance, created_at
            FROM accounts
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_account(&row),
            None => Err(StoreError::not_found("account", username)),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, username, balance, initial_balance, created_at FROM accounts ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn get_catalog_item(&self, name: &str) -> Result<CatalogItem, StoreError> {
        let row = sqlx::query("SELECT id, name, price FROM catalog_items WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(StoreError::not_found("item", name)),
        }
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let rows = sqlx::query("SELECT id, name, price FROM catalog_items ORDER BY price, name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn seed_catalog(&self, items: &[CatalogSeed]) -> Result<usize, StoreError> {
        self.ensure_writable()?;
        if let Some(bad) = items.iter().find(|seed| seed.price <= 0) {
            return Err(StoreError::InvalidAmount(bad.price));
        }

        let mut tx = self.pool.begin().await?;
        let outcome = Self::seed_in_tx(&mut *tx, items).await;
        let inserted = self.finish(tx, outcome).await?;
        info!(inserted, total = items.len(), "Catalog seeded");
        Ok(inserted)
    }

    async fn atomic_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Coins,
        key: Option<IdempotencyKey>,
    ) -> Result<TransferReceipt, StoreError> {
        self.ensure_writable()?;
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;
        let outcome = Self::transfer_in_tx(&mut *tx, from, to, amount, key).await;
        self.finish(tx, outcome).await
    }

    async fn atomic_purchase(
        &self,
        account: AccountId,
        item: ItemId,
        price: Coins,
    ) -> Result<LedgerEntry, StoreError> {
        self.ensure_writable()?;
        if price <= 0 {
            return Err(StoreError::InvalidAmount(price));
        }

        let mut tx = self.pool.begin().await?;
        let outcome = Self::purchase_in_tx(&mut *tx, account, item, price).await;
        self.finish(tx, outcome).await
    }

    async fn list_holdings(&self, account: AccountId) -> Result<Vec<Holding>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.name, h.quantity
            FROM holdings h
            JOIN catalog_items c ON c.id = h.item_id
            WHERE h.account_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(account.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Holding {
                    item: row.try_get("name")?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn list_ledger_entries(
        &self,
        account: AccountId,
        direction: Direction,
    ) -> Result<Vec<CoinMovement>, StoreError> {
        // The counterparty is whoever sits on the other side of the entry.
        // Purchases have no destination account and drop out of the join.
        let query = match direction {
            Direction::Incoming => {
                r#"
                SELECT a.username AS counterparty, e.amount
                FROM ledger_entries e
                JOIN accounts a ON a.id = e.from_account_id
                WHERE e.to_account_id = ?
                ORDER BY e.sequence
                "#
            }
            Direction::Outgoing => {
                r#"
                SELECT a.username AS counterparty, e.amount
                FROM ledger_entries e
                JOIN accounts a ON a.id = e.to_account_id
                WHERE e.from_account_id = ?
                ORDER BY e.sequence
                "#
            }
        };

        let rows = sqlx::query(query)
            .bind(account.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CoinMovement {
                    counterparty: row.try_get("counterparty")?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect()
    }

    async fn list_all_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY sequence"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn ledger_totals(&self) -> Result<LedgerTotals, StoreError> {
        let accounts = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS count,
                COALESCE(SUM(balance), 0) AS total_balance,
                COALESCE(SUM(initial_balance), 0) AS total_granted,
                COALESCE(SUM(CASE WHEN balance < 0 THEN 1 ELSE 0 END), 0) AS negative
            FROM accounts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let entries = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS count,
                COALESCE(SUM(CASE WHEN to_account_id IS NULL THEN amount ELSE 0 END), 0) AS spent,
                COALESCE(SUM(CASE WHEN amount <= 0 THEN 1 ELSE 0 END), 0) AS invalid,
                MIN(sequence) AS min_seq,
                MAX(sequence) AS max_seq
            FROM ledger_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let entry_count: i64 = entries.try_get("count")?;
        let min_seq: Option<i64> = entries.try_get("min_seq")?;
        let max_seq: Option<i64> = entries.try_get("max_seq")?;
        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => min != 1 || (max - min + 1) != entry_count,
            _ => false,
        };

        Ok(LedgerTotals {
            account_count: accounts.try_get("count")?,
            entry_count,
            total_balance: accounts.try_get("total_balance")?,
            total_granted: accounts.try_get("total_granted")?,
            total_spent: entries.try_get("spent")?,
            negative_balances: accounts.try_get("negative")?,
            invalid_amounts: entries.try_get("invalid")?,
            has_sequence_gaps,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("invalid id '{raw}': {e}")))
}

fn parse_optional_id(raw: Option<String>) -> Result<Option<Uuid>, StoreError> {
    raw.as_deref().map(parse_id).transpose()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp '{raw}': {e}")))
}

fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        username: row.try_get("username")?,
        balance: row.try_get("balance")?,
        initial_balance: row.try_get("initial_balance")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<CatalogItem, StoreError> {
    Ok(CatalogItem {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry, StoreError> {
    Ok(LedgerEntry {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        sequence: row.try_get("sequence")?,
        from_account: parse_optional_id(row.try_get("from_account_id")?)?,
        to_account: parse_optional_id(row.try_get("to_account_id")?)?,
        item: parse_optional_id(row.try_get("item_id")?)?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::application::EconomyService;
    use crate::domain::build_integrity_report;

    async fn test_repo() -> (Repository, TempDir) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(&DatabaseConfig::new(temp.path().join("ledger.db")))
            .await
            .unwrap();
        repo.seed_catalog(&[CatalogSeed::new("cup", 20)])
            .await
            .unwrap();
        (repo, temp)
    }

    #[tokio::test]
    async fn test_poisoned_repository_refuses_every_mutation() {
        let (repo, _temp) = test_repo().await;
        let alice = repo.create_account("alice", 100).await.unwrap();
        let bob = repo.create_account("bob", 0).await.unwrap();
        let cup = repo.get_catalog_item("cup").await.unwrap();
        repo.atomic_purchase(alice.id, cup.id, cup.price)
            .await
            .unwrap();

        repo.mark_poisoned();
        assert!(repo.is_poisoned());

        let result = repo.create_account("carol", 100).await;
        assert!(matches!(result, Err(StoreError::Poisoned)));
        let result = repo.seed_catalog(&[CatalogSeed::new("pen", 10)]).await;
        assert!(matches!(result, Err(StoreError::Poisoned)));
        let result = repo.atomic_transfer(alice.id, bob.id, 10, None).await;
        assert!(matches!(result, Err(StoreError::Poisoned)));
        let result = repo
            .atomic_transfer(alice.id, bob.id, 10, Some(IdempotencyKey::new()))
            .await;
        assert!(matches!(result, Err(StoreError::Poisoned)));
        let result = repo.atomic_purchase(alice.id, cup.id, cup.price).await;
        assert!(matches!(result, Err(StoreError::Poisoned)));

        // Reads keep working and show the last committed state
        assert_eq!(repo.get_account("alice").await.unwrap().balance, 80);
        let holdings = repo.list_holdings(alice.id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 1);
        assert_eq!(repo.list_all_entries().await.unwrap().len(), 1);
        assert_eq!(repo.list_catalog().await.unwrap().len(), 1);
        assert!(repo.get_account("carol").await.is_err());
        let totals = repo.ledger_totals().await.unwrap();
        assert!(build_integrity_report(&totals).is_healthy());
    }

    #[tokio::test]
    async fn test_poisoned_repository_is_fatal_for_services() {
        let (repo, _temp) = test_repo().await;
        repo.create_account("alice", 100).await.unwrap();
        repo.create_account("bob", 0).await.unwrap();
        let repo = Arc::new(repo);
        let economy = EconomyService::new(Arc::clone(&repo), 1000);

        repo.mark_poisoned();

        let err = economy.send_coins("alice", "bob", 10).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!err.is_rejection());

        let err = economy.buy_item("alice", "cup").await.unwrap_err();
        assert!(err.is_fatal());

        let err = economy.open_account("carol").await.unwrap_err();
        assert!(err.is_fatal());

        // An existing account is still returned; opening it needs no write
        let opening = economy.open_account("alice").await.unwrap();
        assert!(!opening.created);
        assert_eq!(opening.account.balance, 100);
    }
}
