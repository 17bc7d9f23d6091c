use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque signed payload handed over by the store for one purchase event.
/// Only the validator looks inside; it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReceiptEnvelope(pub String);

impl RawReceiptEnvelope {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A single entitlement extracted from a verified envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedReceipt {
    /// Store-specific SKU, not the catalog product ID
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    /// Unique per transaction
    pub transaction_id: String,
}
