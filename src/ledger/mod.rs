//! Receipt ledger: durable record of entitlements already redeemed.

mod sqlite;

pub use sqlite::{LedgerPool, SqliteLedger, create_pool, init_db};

use std::sync::RwLock;

use crate::error::{IapError, Result};
use crate::models::{Product, ValidatedReceipt};

/// Storage for redeemed receipts.
pub trait ReceiptLedger: Send + Sync {
    /// Record a receipt. Returns `false` if its transaction was already recorded.
    fn append(&self, receipt: &ValidatedReceipt) -> Result<bool>;

    /// All recorded receipts in insertion order.
    fn list(&self) -> Result<Vec<ValidatedReceipt>>;

    fn contains_transaction(&self, transaction_id: &str) -> Result<bool> {
        Ok(self
            .list()?
            .iter()
            .any(|r| r.transaction_id == transaction_id))
    }
}

/// True iff `ledger` holds a receipt for any of `product`'s store SKUs.
pub fn owns_product(ledger: &dyn ReceiptLedger, product: &Product) -> Result<bool> {
    Ok(ledger
        .list()?
        .iter()
        .any(|r| product.has_sku(&r.product_id)))
}

/// In-memory ledger (default for tests and the sandbox).
#[derive(Debug, Default)]
pub struct MemoryLedger {
    receipts: RwLock<Vec<ValidatedReceipt>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReceiptLedger for MemoryLedger {
    fn append(&self, receipt: &ValidatedReceipt) -> Result<bool> {
        let mut receipts = self
            .receipts
            .write()
            .map_err(|_| IapError::Internal("ledger lock poisoned".into()))?;

        if receipts
            .iter()
            .any(|r| r.transaction_id == receipt.transaction_id)
        {
            return Ok(false);
        }
        receipts.push(receipt.clone());
        Ok(true)
    }

    fn list(&self) -> Result<Vec<ValidatedReceipt>> {
        self.receipts
            .read()
            .map(|r| r.clone())
            .map_err(|_| IapError::Internal("ledger lock poisoned".into()))
    }
}
