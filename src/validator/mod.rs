//! Receipt validation.
//!
//! Envelopes use the SDK's unified receipt format:
//! `{"Store": "<store name>", "TransactionID": "...", "Payload": "<store payload>"}`.
//! The payload is verified with the public key of the store named in the
//! envelope. Any failure rejects the whole envelope; a valid envelope may carry
//! zero, one or many entitlements.

mod apple;
mod google;
pub mod signing;

pub use apple::{AppleInAppPurchase, AppleReceiptClaims};
pub use google::GooglePurchaseData;

use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::{IapError, ReceiptError, Result, msg};
use crate::models::{RawReceiptEnvelope, Store, ValidatedReceipt};

/// Base64-encoded Ed25519 public keys, one per store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreKeys {
    pub google: Option<String>,
    pub apple: Option<String>,
}

/// Verifies a raw envelope and extracts its entitlements.
///
/// Implementations must be pure: no persistent state is read or written.
pub trait ReceiptValidator: Send + Sync {
    fn validate(
        &self,
        envelope: &RawReceiptEnvelope,
    ) -> std::result::Result<Vec<ValidatedReceipt>, ReceiptError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UnifiedReceipt {
    #[serde(rename = "Store")]
    pub store: String,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    #[serde(rename = "Payload")]
    pub payload: String,
}

/// Validator for both supported stores.
#[derive(Debug, Clone)]
pub struct CrossPlatformValidator {
    google: Option<VerifyingKey>,
    apple: Option<VerifyingKey>,
    app_identifier: String,
}

impl CrossPlatformValidator {
    pub fn new(keys: &StoreKeys, app_identifier: &str) -> Result<Self> {
        Ok(Self {
            google: keys.google.as_deref().map(decode_public_key).transpose()?,
            apple: keys.apple.as_deref().map(decode_public_key).transpose()?,
            app_identifier: app_identifier.to_string(),
        })
    }

    fn key_for(&self, store: Store) -> Option<&VerifyingKey> {
        match store {
            Store::GooglePlay => self.google.as_ref(),
            Store::AppleAppStore => self.apple.as_ref(),
        }
    }
}

impl ReceiptValidator for CrossPlatformValidator {
    fn validate(
        &self,
        envelope: &RawReceiptEnvelope,
    ) -> std::result::Result<Vec<ValidatedReceipt>, ReceiptError> {
        tracing::debug!("Start validate receipt");

        let unified: UnifiedReceipt = serde_json::from_str(envelope.as_str())
            .map_err(|_| ReceiptError::Malformed(msg::INVALID_ENVELOPE.into()))?;

        let store: Store = unified
            .store
            .parse()
            .map_err(|_| ReceiptError::UnsupportedStore(unified.store.clone()))?;

        let key = self
            .key_for(store)
            .ok_or_else(|| ReceiptError::MissingPublicKey(store.to_string()))?;

        let receipts = match store {
            Store::GooglePlay => google::verify(&unified.payload, key, &self.app_identifier)?,
            Store::AppleAppStore => apple::verify(&unified.payload, key, &self.app_identifier)?,
        };

        for receipt in &receipts {
            tracing::debug!(
                "Validated receipt: {}, {}, {}",
                receipt.product_id,
                receipt.purchase_date,
                receipt.transaction_id
            );
        }

        Ok(receipts)
    }
}

/// Decode a base64 Ed25519 public key (32 bytes).
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| IapError::Internal(format!("{}: {}", msg::INVALID_PUBLIC_KEY, e)))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| IapError::Internal(format!("{}: expected 32 bytes", msg::INVALID_PUBLIC_KEY)))?;

    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| IapError::Internal(format!("{}: {}", msg::INVALID_PUBLIC_KEY, e)))
}
