//! Product catalog loaded once at startup from the product table.
//!
//! The table is CSV with the header
//! `productID,googleID,appleID,productType,rewardType,rewardID,rewardAmount`.
//! `productType` is the integer encoding of [`ProductKind`]. An empty SKU cell
//! means the product is not sold on that store.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{IapError, Result};
use crate::models::{Product, ProductKind, ProductRegistration, RewardDescriptor, Store};

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "productID")]
    product_id: String,
    #[serde(rename = "googleID")]
    google_id: String,
    #[serde(rename = "appleID")]
    apple_id: String,
    #[serde(rename = "productType")]
    product_type: String,
    #[serde(rename = "rewardType")]
    reward_type: String,
    #[serde(rename = "rewardID")]
    reward_id: String,
    #[serde(rename = "rewardAmount")]
    reward_amount: String,
}

impl CatalogRow {
    /// `line` is the 1-based data row number, used in error messages.
    fn into_product(self, line: usize) -> Result<Product> {
        let bad = |what: &str| IapError::CatalogLoad(format!("row {}: {}", line, what));

        if self.product_id.is_empty() {
            return Err(bad("productID is empty"));
        }
        if self.reward_type.is_empty() {
            return Err(bad("rewardType is empty"));
        }
        if self.reward_id.is_empty() {
            return Err(bad("rewardID is empty"));
        }

        let kind = self
            .product_type
            .parse::<i64>()
            .ok()
            .and_then(ProductKind::from_code)
            .ok_or_else(|| bad(&format!("unknown productType '{}'", self.product_type)))?;

        let amount: u64 = self
            .reward_amount
            .parse()
            .map_err(|_| bad(&format!("invalid rewardAmount '{}'", self.reward_amount)))?;

        let mut skus = BTreeMap::new();
        if !self.google_id.is_empty() {
            skus.insert(Store::GooglePlay, self.google_id);
        }
        if !self.apple_id.is_empty() {
            skus.insert(Store::AppleAppStore, self.apple_id);
        }
        if skus.is_empty() {
            return Err(bad("product has neither googleID nor appleID"));
        }

        Ok(Product {
            reward: RewardDescriptor {
                reward_type: self.reward_type,
                reward_id: self.reward_id,
                amount,
                source_product_id: self.product_id.clone(),
            },
            product_id: self.product_id,
            skus,
            kind,
        })
    }
}

/// Immutable table of purchasable products keyed by catalog product ID.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Parse a product table. Any malformed row fails the whole load.
    pub fn load<R: Read>(source: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);

        let mut products = Vec::new();
        for (i, row) in reader.deserialize::<CatalogRow>().enumerate() {
            let row = row.map_err(|e| IapError::CatalogLoad(format!("row {}: {}", i + 1, e)))?;
            products.push(row.into_product(i + 1)?);
        }

        let catalog = Self::from_products(products)?;
        tracing::info!("Catalog loaded: {} product(s)", catalog.len());
        Ok(catalog)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            IapError::CatalogLoad(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::load(file)
    }

    /// Build a catalog from already-parsed products. Product IDs must be unique.
    pub fn from_products(products: Vec<Product>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(products.len());
        for (idx, product) in products.iter().enumerate() {
            if by_id.insert(product.product_id.clone(), idx).is_some() {
                return Err(IapError::CatalogLoad(format!(
                    "duplicate productID '{}'",
                    product.product_id
                )));
            }
        }
        Ok(Self { products, by_id })
    }

    pub fn lookup_by_product_id(&self, product_id: &str) -> Option<&Product> {
        self.by_id.get(product_id).map(|&idx| &self.products[idx])
    }

    pub fn lookup_by_store_sku(&self, store: Store, sku: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.sku(store) == Some(sku))
    }

    /// Receipts only carry the store SKU, so inbound entitlements are matched
    /// against every store's SKU.
    pub fn lookup_by_any_sku(&self, sku: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.has_sku(sku))
    }

    /// Registration request listing every product with its per-store SKUs.
    pub fn registrations(&self) -> Vec<ProductRegistration> {
        self.products
            .iter()
            .map(|p| {
                tracing::debug!(
                    "{} added. Google ID: {:?}, Apple ID: {:?}",
                    p.product_id,
                    p.sku(Store::GooglePlay),
                    p.sku(Store::AppleAppStore)
                );
                ProductRegistration::from(p)
            })
            .collect()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
