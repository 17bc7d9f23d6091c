//! Receipt signing with development key material.
//!
//! Production receipts are signed by the stores. These helpers produce
//! envelopes in the same format for the sandbox gateway, the `keygen` command
//! and tests.

use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use jwt_simple::prelude::*;
use rand::rngs::OsRng;

use super::UnifiedReceipt;
use super::apple::AppleReceiptClaims;
use super::google::{GooglePayload, GooglePurchaseData};
use crate::error::{IapError, Result};
use crate::models::{RawReceiptEnvelope, Store};

/// Generate a new Ed25519 key pair
/// Returns (private_key_bytes, public_key_base64)
pub fn generate_keypair() -> (Vec<u8>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    let private_bytes = signing_key.to_bytes().to_vec();
    let public_b64 = STANDARD.encode(verifying_key.to_bytes());

    (private_bytes, public_b64)
}

/// Signs receipts the way a store would.
#[derive(Clone)]
pub struct ReceiptSigner {
    key: SigningKey,
}

impl ReceiptSigner {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(private_key: &[u8]) -> Result<Self> {
        let key_bytes: [u8; 32] = private_key
            .try_into()
            .map_err(|_| IapError::Internal("Invalid private key length".into()))?;
        Ok(Self {
            key: SigningKey::from_bytes(&key_bytes),
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.key.verifying_key().to_bytes())
    }

    pub fn sign_google(&self, data: &GooglePurchaseData) -> Result<RawReceiptEnvelope> {
        let json = serde_json::to_string(data)?;
        let signature = self.key.sign(json.as_bytes());

        let payload = serde_json::to_string(&GooglePayload {
            json,
            signature: STANDARD.encode(signature.to_bytes()),
        })?;

        wrap(Store::GooglePlay, &data.order_id, payload)
    }

    pub fn sign_apple(
        &self,
        claims: &AppleReceiptClaims,
        transaction_id: &str,
    ) -> Result<RawReceiptEnvelope> {
        let key_pair = Ed25519KeyPair::from_bytes(&self.key.to_keypair_bytes())
            .map_err(|e| IapError::Internal(format!("Failed to create key pair: {}", e)))?;

        let jwt_claims = Claims::with_custom_claims(claims.clone(), Duration::from_days(3650));
        let token = key_pair
            .sign(jwt_claims)
            .map_err(|e| IapError::Internal(format!("Failed to sign receipt: {}", e)))?;

        wrap(Store::AppleAppStore, transaction_id, token)
    }
}

impl std::fmt::Debug for ReceiptSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptSigner")
            .field("public_key", &self.public_key_base64())
            .finish()
    }
}

fn wrap(store: Store, transaction_id: &str, payload: String) -> Result<RawReceiptEnvelope> {
    let unified = UnifiedReceipt {
        store: store.to_string(),
        transaction_id: transaction_id.to_string(),
        payload,
    };
    Ok(RawReceiptEnvelope::new(serde_json::to_string(&unified)?))
}
