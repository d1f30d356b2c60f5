mod common;

use anyhow::Result;
use common::{Users, test_ledger};
use merchcoin::io::Exporter;

#[tokio::test]
async fn test_export_entries_csv_resolves_names() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    Users::alice_and_bob(&ledger).await?;
    ledger.economy.send_coins("alice", "bob", 30).await?;
    ledger.economy.buy_item("bob", "socks").await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&ledger.query)
        .export_entries_csv(&mut buffer)
        .await?;
    assert_eq!(count, 2);

    let mut reader = csv::Reader::from_reader(buffer.as_slice());
    let headers = reader.headers()?.clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["sequence", "id", "created_at", "from", "to", "item", "amount"]
    );

    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(&rows[0][0], "1");
    assert_eq!(&rows[0][3], "alice");
    assert_eq!(&rows[0][4], "bob");
    assert_eq!(&rows[0][5], "");
    assert_eq!(&rows[0][6], "30");

    assert_eq!(&rows[1][3], "bob");
    assert_eq!(&rows[1][4], "");
    assert_eq!(&rows[1][5], "socks");
    assert_eq!(&rows[1][6], "10");
    Ok(())
}

#[tokio::test]
async fn test_export_balances_and_snapshot() -> Result<()> {
    let (ledger, _temp) = test_ledger().await?;
    Users::alice_and_bob(&ledger).await?;
    ledger.economy.send_coins("bob", "alice", 20).await?;
    let exporter = Exporter::new(&ledger.query);

    let mut buffer = Vec::new();
    assert_eq!(exporter.export_balances_csv(&mut buffer).await?, 2);
    let text = String::from_utf8(buffer)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "username,balance,initial_balance,created_at");
    assert!(lines[1].starts_with("alice,120,100,"));
    assert!(lines[2].starts_with("bob,30,50,"));

    let mut buffer = Vec::new();
    let snapshot = exporter.export_full_json(&mut buffer).await?;
    assert_eq!(snapshot.accounts.len(), 2);
    assert_eq!(snapshot.catalog.len(), 10);
    assert_eq!(snapshot.entries.len(), 1);

    let json: serde_json::Value = serde_json::from_slice(&buffer)?;
    assert_eq!(json["entries"][0]["amount"], 20);
    assert_eq!(json["accounts"][0]["username"], "alice");
    Ok(())
}
