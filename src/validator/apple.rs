//! Apple-style receipts: a compact JWS (EdDSA) over the app receipt, which can
//! list several in-app transactions.

use chrono::DateTime;
use ed25519_dalek::VerifyingKey;
use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ReceiptError;
use crate::models::ValidatedReceipt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleInAppPurchase {
    pub product_id: String,
    pub transaction_id: String,
    pub purchase_date_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleReceiptClaims {
    pub bundle_id: String,
    pub in_app: Vec<AppleInAppPurchase>,
}

pub(crate) fn verify(
    payload: &str,
    key: &VerifyingKey,
    app_identifier: &str,
) -> Result<Vec<ValidatedReceipt>, ReceiptError> {
    let public_key = Ed25519PublicKey::from_bytes(&key.to_bytes())
        .map_err(|_| ReceiptError::InvalidSignature)?;

    let claims = public_key
        .verify_token::<AppleReceiptClaims>(payload, None)
        .map_err(|e| {
            tracing::debug!("Apple receipt rejected: {}", e);
            ReceiptError::InvalidSignature
        })?
        .custom;

    if claims.bundle_id != app_identifier {
        return Err(ReceiptError::WrongAppIdentifier {
            expected: app_identifier.to_string(),
            found: claims.bundle_id,
        });
    }

    claims
        .in_app
        .into_iter()
        .map(|iap| {
            let purchase_date = DateTime::from_timestamp_millis(iap.purchase_date_ms)
                .ok_or_else(|| ReceiptError::Malformed("purchase_date_ms out of range".into()))?;
            Ok(ValidatedReceipt {
                product_id: iap.product_id,
                purchase_date,
                transaction_id: iap.transaction_id,
            })
        })
        .collect()
}
