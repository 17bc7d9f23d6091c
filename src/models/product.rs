use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Platform store a SKU or receipt belongs to.
///
/// String forms match the store names the SDK writes into receipt envelopes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, AsRefStr,
    EnumString,
)]
pub enum Store {
    GooglePlay,
    AppleAppStore,
}

impl Store {
    pub const ALL: [Store; 2] = [Store::GooglePlay, Store::AppleAppStore];
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
pub enum ProductKind {
    Consumable,
    NonConsumable,
    Subscription,
}

impl ProductKind {
    /// Decode the integer encoding used by the product table.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ProductKind::Consumable),
            1 => Some(ProductKind::NonConsumable),
            2 => Some(ProductKind::Subscription),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ProductKind::Consumable => 0,
            ProductKind::NonConsumable => 1,
            ProductKind::Subscription => 2,
        }
    }
}

/// What the player receives for a product. Passed by value to the reward sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDescriptor {
    pub reward_type: String,
    pub reward_id: String,
    pub amount: u64,
    pub source_product_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Cross-platform catalog ID (primary key)
    pub product_id: String,
    /// Store-specific SKUs. Stores the product is not sold on are absent.
    pub skus: BTreeMap<Store, String>,
    pub kind: ProductKind,
    pub reward: RewardDescriptor,
}

impl Product {
    pub fn sku(&self, store: Store) -> Option<&str> {
        self.skus.get(&store).map(String::as_str)
    }

    /// True if `sku` is this product's SKU on any store.
    pub fn has_sku(&self, sku: &str) -> bool {
        self.skus.values().any(|s| s == sku)
    }
}

/// One entry of the registration request submitted to the store on initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRegistration {
    pub product_id: String,
    pub kind: ProductKind,
    pub skus: BTreeMap<Store, String>,
}

impl From<&Product> for ProductRegistration {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.product_id.clone(),
            kind: p.kind,
            skus: p.skus.clone(),
        }
    }
}
