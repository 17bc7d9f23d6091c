//! Google-style receipts: purchase data JSON plus a detached signature over
//! its exact bytes.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::DateTime;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{ReceiptError, msg};
use crate::models::ValidatedReceipt;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GooglePayload {
    pub json: String,
    pub signature: String,
}

/// Purchase data as issued by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePurchaseData {
    pub order_id: String,
    pub package_name: String,
    pub product_id: String,
    /// Unix timestamp in milliseconds
    pub purchase_time: i64,
    pub purchase_token: String,
}

pub(crate) fn verify(
    payload: &str,
    key: &VerifyingKey,
    app_identifier: &str,
) -> Result<Vec<ValidatedReceipt>, ReceiptError> {
    let payload: GooglePayload = serde_json::from_str(payload)
        .map_err(|_| ReceiptError::Malformed(msg::INVALID_PAYLOAD.into()))?;

    let signature_bytes = STANDARD
        .decode(&payload.signature)
        .map_err(|_| ReceiptError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| ReceiptError::InvalidSignature)?;

    // Signature covers the raw JSON text, not a re-serialization of it
    key.verify(payload.json.as_bytes(), &signature)
        .map_err(|_| ReceiptError::InvalidSignature)?;

    let data: GooglePurchaseData = serde_json::from_str(&payload.json)
        .map_err(|_| ReceiptError::Malformed(msg::INVALID_PAYLOAD.into()))?;

    if data.package_name != app_identifier {
        return Err(ReceiptError::WrongAppIdentifier {
            expected: app_identifier.to_string(),
            found: data.package_name,
        });
    }

    let purchase_date = DateTime::from_timestamp_millis(data.purchase_time)
        .ok_or_else(|| ReceiptError::Malformed("purchaseTime out of range".into()))?;

    Ok(vec![ValidatedReceipt {
        product_id: data.product_id,
        purchase_date,
        transaction_id: data.order_id,
    }])
}
