use std::fs::File;
use std::io::{stdout, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::application::{AppError, Ledger};
use crate::config::Config;
use crate::domain::{parse_coins, IdempotencyKey};
use crate::io::Exporter;
use crate::storage::Repository;

/// Merchcoin - coin ledger for the merch store
#[derive(Parser)]
#[command(name = "merchcoin")]
#[command(about = "Coin balances, transfers and merch purchases backed by an auditable ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides the config file)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and seed the catalog
    Init,

    /// Open an account, or show it if it already exists
    Open {
        /// Username
        username: String,
    },

    /// Send coins to another user
    Send {
        /// Number of coins (whole coins only)
        amount: String,

        /// Sender username
        #[arg(long)]
        from: String,

        /// Recipient username
        #[arg(long)]
        to: String,

        /// Idempotency key (UUID); repeating a send with the same key applies it once
        #[arg(long)]
        key: Option<String>,
    },

    /// Buy one item from the catalog
    Buy {
        /// Item name
        item: String,

        /// Buyer username
        #[arg(short, long)]
        user: String,
    },

    /// Show a user's coins, inventory and transfer history
    Info {
        /// Username
        username: String,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show balance for a user or all users
    Balance {
        /// Username (omit for all accounts)
        username: Option<String>,
    },

    /// List catalog items and prices
    Catalog,

    /// List the ledger, oldest entry first
    Log {
        /// Only show the most recent entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: entries, balances, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `verbose`.
/// Events go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,merchcoin=debug,sqlx=warn"
    } else {
        "warn,merchcoin=info,sqlx=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("Failed to load config")?;
        if let Some(path) = &self.database {
            config = config.with_database_path(path);
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let ledger = Ledger::open(&config).await?;

        let outcome = self.dispatch(&ledger, &config).await;
        ledger.store().close().await;
        outcome
    }

    async fn dispatch(self, ledger: &Ledger<Repository>, config: &Config) -> Result<()> {
        match self.command {
            Commands::Init => {
                let items = ledger.query.list_catalog().await?;
                println!(
                    "Database initialized: {} ({} catalog items)",
                    config.database.path.display(),
                    items.len()
                );
            }

            Commands::Open { username } => {
                let opening = ledger.economy.open_account(&username).await?;
                let verb = if opening.created { "Opened" } else { "Found" };
                println!(
                    "{} account: {} ({} coins)",
                    verb, opening.account.username, opening.account.balance
                );
            }

            Commands::Send {
                amount,
                from,
                to,
                key,
            } => {
                let amount = parse_coins(&amount).context("Invalid amount")?;
                let result = match key {
                    Some(key) => {
                        let key: IdempotencyKey =
                            key.parse().context("Invalid idempotency key")?;
                        ledger
                            .economy
                            .send_coins_with_key(&from, &to, amount, key)
                            .await?
                    }
                    None => ledger.economy.send_coins(&from, &to, amount).await?,
                };

                let note = if result.replayed {
                    " (already applied)"
                } else {
                    ""
                };
                println!(
                    "Sent {} coins: {} -> {} [#{}]{}",
                    result.entry.amount,
                    result.from_username,
                    result.to_username,
                    result.entry.sequence,
                    note
                );
            }

            Commands::Buy { item, user } => {
                let result = ledger.economy.buy_item(&user, &item).await?;
                println!(
                    "{} bought {} for {} coins [#{}]",
                    result.username, result.item.name, result.item.price, result.entry.sequence
                );
            }

            Commands::Info { username, json } => {
                run_info_command(ledger, &username, json).await?;
            }

            Commands::Balance { username } => {
                run_balance_command(ledger, username).await?;
            }

            Commands::Catalog => {
                let items = ledger.query.list_catalog().await?;
                if items.is_empty() {
                    println!("Catalog is empty.");
                } else {
                    println!("{:<20} {:>8}", "ITEM", "PRICE");
                    println!("{}", "-".repeat(29));
                    for item in items {
                        println!("{:<20} {:>8}", item.name, item.price);
                    }
                }
            }

            Commands::Log { limit } => {
                run_log_command(ledger, limit).await?;
            }

            Commands::Check => {
                run_check_command(ledger).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                run_export_command(ledger, &export_type, output).await?;
            }
        }

        Ok(())
    }
}

/// Process exit status for a failed command. A poisoned store gets its own
/// code so supervisors can tell it apart from ordinary rejections.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AppError>() {
        Some(app) if app.is_fatal() => 2,
        _ => 1,
    }
}

async fn run_info_command(ledger: &Ledger<Repository>, username: &str, json: bool) -> Result<()> {
    let summary = ledger.query.get_summary(username).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("User:  {}", username);
    println!("Coins: {}", summary.coins);
    println!();

    println!("Inventory:");
    if summary.inventory.is_empty() {
        println!("  (nothing yet)");
    }
    for holding in &summary.inventory {
        println!("  {:<20} x{}", holding.item, holding.quantity);
    }
    println!();

    println!("Received:");
    if summary.coin_history.received.is_empty() {
        println!("  (none)");
    }
    for movement in &summary.coin_history.received {
        println!("  {:<20} {:>8}", movement.counterparty, movement.amount);
    }

    println!("Sent:");
    if summary.coin_history.sent.is_empty() {
        println!("  (none)");
    }
    for movement in &summary.coin_history.sent {
        println!("  {:<20} {:>8}", movement.counterparty, movement.amount);
    }
    Ok(())
}

async fn run_balance_command(ledger: &Ledger<Repository>, username: Option<String>) -> Result<()> {
    match username {
        Some(name) => {
            let balance = ledger.query.get_balance(&name).await?;
            println!("{}: {}", name, balance);
        }
        None => {
            let accounts = ledger.query.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:>10}", "USER", "COINS");
                println!("{}", "-".repeat(31));
                for account in accounts {
                    println!("{:<20} {:>10}", account.username, account.balance);
                }
            }
        }
    }
    Ok(())
}

async fn run_log_command(ledger: &Ledger<Repository>, limit: Option<usize>) -> Result<()> {
    let entries = ledger.query.list_entries().await?;
    if entries.is_empty() {
        println!("No ledger entries.");
        return Ok(());
    }

    let accounts = ledger.query.list_accounts().await?;
    let catalog = ledger.query.list_catalog().await?;
    let username = |id: Option<uuid::Uuid>| -> &str {
        accounts
            .iter()
            .find(|account| Some(account.id) == id)
            .map(|account| account.username.as_str())
            .unwrap_or("?")
    };

    let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));

    println!(
        "{:>6} {:<20} {:<15} {:<15} {:>8}",
        "SEQ", "DATE", "FROM", "TO", "AMOUNT"
    );
    println!("{}", "-".repeat(68));
    for entry in entries.iter().skip(skip) {
        let to = match entry.item {
            Some(item) => catalog
                .iter()
                .find(|candidate| candidate.id == item)
                .map(|candidate| format!("[{}]", candidate.name))
                .unwrap_or_else(|| "[?]".to_string()),
            None => username(entry.to_account).to_string(),
        };
        println!(
            "{:>6} {:<20} {:<15} {:<15} {:>8}",
            entry.sequence,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(username(entry.from_account), 15),
            truncate(&to, 15),
            entry.amount
        );
    }
    Ok(())
}

async fn run_check_command(ledger: &Ledger<Repository>) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = ledger.query.check_integrity().await?;

    println!("Accounts:      {}", report.account_count);
    println!("Entries:       {}", report.entry_count);
    println!();
    println!("  {:<14} {:>10}", "Granted:", report.total_granted);
    println!("  {:<14} {:>10}", "Balances:", report.total_balance);
    println!("  {:<14} {:>10}", "Spent on merch:", report.total_spent);
    println!("  {}", "-".repeat(25));
    println!(
        "  {:<14} {:>10}  {}",
        "Difference:",
        report.total_granted - report.total_balance - report.total_spent,
        if report.is_balanced {
            "OK"
        } else {
            "UNBALANCED!"
        }
    );
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    ledger: &Ledger<Repository>,
    export_type: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let exporter = Exporter::new(&ledger.query);

    let writer: Box<dyn Write> = match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "entries" => {
            let count = exporter.export_entries_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} ledger entries", count);
            }
        }
        "balances" => {
            let count = exporter.export_balances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full ledger: {} accounts, {} catalog items, {} entries",
                    snapshot.accounts.len(),
                    snapshot.catalog.len(),
                    snapshot.entries.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: entries, balances, full",
                export_type
            );
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("alice", 15), "alice");
        assert_eq!(truncate("a-very-long-username", 10), "a-very-...");
    }

    #[test]
    fn test_poisoned_store_gets_distinct_exit_code() {
        use crate::storage::StoreError;

        let fatal = anyhow::Error::new(AppError::Store(StoreError::Poisoned));
        assert_eq!(exit_code(&fatal), 2);

        let rejected = anyhow::Error::new(AppError::SelfTransfer("alice".into()));
        assert_eq!(exit_code(&rejected), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_send_parses() {
        let cli = Cli::try_parse_from([
            "merchcoin", "--database", "/tmp/m.db", "send", "30", "--from", "alice", "--to",
            "bob",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/m.db")));
        assert!(matches!(
            cli.command,
            Commands::Send { ref amount, ref key, .. } if amount == "30" && key.is_none()
        ));
    }
}
