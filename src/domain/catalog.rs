use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Coins;

pub type ItemId = Uuid;

/// A piece of merch that can be bought with coins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    pub price: Coins,
}

impl CatalogItem {
    pub fn new(name: impl Into<String>, price: Coins) -> Self {
        assert!(price > 0, "Item price must be positive");
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
        }
    }
}

/// Catalog entry as it appears in configuration, before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSeed {
    pub name: String,
    pub price: Coins,
}

impl CatalogSeed {
    pub fn new(name: impl Into<String>, price: Coins) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// The stock merch list the store opens with.
pub fn default_catalog() -> Vec<CatalogSeed> {
    [
        ("t-shirt", 80),
        ("cup", 20),
        ("book", 50),
        ("pen", 10),
        ("powerbank", 200),
        ("hoody", 300),
        ("umbrella", 200),
        ("socks", 10),
        ("wallet", 50),
        ("pink-hoody", 500),
    ]
    .into_iter()
    .map(|(name, price)| CatalogSeed::new(name, price))
    .collect()
}

/// Quantity of one catalog item owned by an account. Quantity is always >= 1;
/// an account that never bought an item simply has no holding for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    #[serde(rename = "type")]
    pub item: String,
    pub quantity: i64,
}
