use std::env;
use std::time::Duration;

use crate::error::{IapError, Result};
use crate::validator::StoreKeys;

#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_path: String,
    pub ledger_path: String,
    /// Package name / bundle identifier receipts must be issued for
    pub app_identifier: String,
    pub store_keys: StoreKeys,
    /// Upper bound on how long a gateway call may go unanswered
    pub gateway_timeout: Duration,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("IAP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let gateway_timeout_secs: u64 = env::var("IAP_GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        let google = key_from_env("IAP_GOOGLE_PUBLIC_KEY");
        let apple = key_from_env("IAP_APPLE_PUBLIC_KEY");

        Self {
            catalog_path: env::var("IAP_CATALOG_PATH")
                .unwrap_or_else(|_| "products.csv".to_string()),
            ledger_path: env::var("IAP_LEDGER_PATH")
                .unwrap_or_else(|_| "iap_ledger.db".to_string()),
            app_identifier: env::var("IAP_APP_IDENTIFIER")
                .unwrap_or_else(|_| "com.example.game".to_string()),
            store_keys: StoreKeys { google, apple },
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            dev_mode,
        }
    }
}

/// Reads a base64 public key either inline (`NAME`) or from a file (`NAME_FILE`).
/// The inline variable wins when both are set.
fn key_from_env(name: &str) -> Option<String> {
    if let Ok(value) = env::var(name) {
        return Some(value.trim().to_string());
    }

    let path = env::var(format!("{}_FILE", name)).ok()?;
    match load_key_from_file(&path) {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!("Ignoring {}_FILE: {}", name, e);
            None
        }
    }
}

/// Load a base64-encoded key from a file, trimming surrounding whitespace.
pub fn load_key_from_file(path: &str) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| IapError::Internal(format!("Failed to read key file {}: {}", path, e)))?;

    let key = contents.trim();
    if key.is_empty() {
        return Err(IapError::Internal(format!("Key file {} is empty", path)));
    }

    Ok(key.to_string())
}
