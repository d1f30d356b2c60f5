mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{Users, assert_consistent, memory_ledger, test_ledger};
use merchcoin::application::{AppError, Ledger};
use merchcoin::storage::LedgerStore;

/// Fire `attempts` concurrent sends of `amount` from alice to bob and
/// return (succeeded, rejected for funds).
async fn race_transfers<S: LedgerStore + 'static>(
    ledger: Arc<Ledger<S>>,
    attempts: usize,
    amount: i64,
) -> Result<(usize, usize)> {
    let mut handles = Vec::new();
    for _ in 0..attempts {
        let economy = ledger.economy.clone();
        handles.push(tokio::spawn(async move {
            economy.send_coins("alice", "bob", amount).await
        }));
    }

    let (mut ok, mut rejected) = (0, 0);
    for handle in handles {
        match handle.await? {
            Ok(_) => ok += 1,
            Err(AppError::InsufficientFunds { .. }) => rejected += 1,
            Err(other) => return Err(other.into()),
        }
    }
    Ok((ok, rejected))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraw_is_prevented() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    Users::alice_and_bob(&ledger).await?;
    let ledger = Arc::new(ledger);

    // alice has 100: only three sends of 30 fit
    let (ok, rejected) = race_transfers(Arc::clone(&ledger), 10, 30).await?;
    assert_eq!(ok, 3);
    assert_eq!(rejected, 7);

    assert_eq!(ledger.query.get_balance("alice").await?, 10);
    assert_eq!(ledger.query.get_balance("bob").await?, 140);
    assert_eq!(ledger.query.list_entries().await?.len(), 3);
    assert_consistent(&ledger).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraw_in_memory() -> Result<()> {
    let ledger = memory_ledger().await?;
    Users::alice_and_bob(&ledger).await?;
    let ledger = Arc::new(ledger);

    let (ok, rejected) = race_transfers(Arc::clone(&ledger), 10, 30).await?;
    assert_eq!((ok, rejected), (3, 7));
    assert_eq!(ledger.query.get_balance("alice").await?, 10);
    assert_consistent(&ledger).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchases_respect_balance() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    ledger.economy.open_account("erin").await?;
    let ledger = Arc::new(ledger);

    // 1000 coins buy at most five powerbanks at 200
    let mut handles = Vec::new();
    for _ in 0..8 {
        let economy = ledger.economy.clone();
        handles.push(tokio::spawn(async move {
            economy.buy_item("erin", "powerbank").await
        }));
    }

    let mut bought = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => bought += 1,
            Err(AppError::InsufficientFunds { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(bought, 5);

    let summary = ledger.query.get_summary("erin").await?;
    assert_eq!(summary.coins, 0);
    assert_eq!(summary.inventory.len(), 1);
    assert_eq!(summary.inventory[0].quantity, 5);
    assert_consistent(&ledger).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_open_account_creates_once() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    let ledger = Arc::new(ledger);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let economy = ledger.economy.clone();
        handles.push(tokio::spawn(async move {
            economy.open_account("frank").await
        }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let opening = handle.await??;
        if opening.created {
            created += 1;
        }
        ids.push(opening.account.id);
    }

    assert_eq!(created, 1);
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(ledger.query.list_accounts().await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossing_transfers_conserve_coins() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    for name in ["p", "q", "r"] {
        ledger.economy.open_account(name).await?;
    }
    let ledger = Arc::new(ledger);

    let pairs = [("p", "q"), ("q", "r"), ("r", "p"), ("q", "p"), ("p", "r"), ("r", "q")];
    let mut handles = Vec::new();
    for round in 0..5 {
        for (from, to) in pairs {
            let economy = ledger.economy.clone();
            handles.push(tokio::spawn(async move {
                economy.send_coins(from, to, 10 + round).await
            }));
        }
    }
    for handle in handles {
        handle.await??;
    }

    let total: i64 = ledger
        .query
        .list_accounts()
        .await?
        .iter()
        .map(|account| account.balance)
        .sum();
    assert_eq!(total, 3000);
    assert_eq!(ledger.query.list_entries().await?.len(), 30);
    assert_consistent(&ledger).await?;
    Ok(())
}
