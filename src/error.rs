use thiserror::Error;

use crate::gateway::{InitializationFailureReason, PurchaseFailureReason};

/// Log/error message fragments shared across modules.
pub mod msg {
    pub const NO_PRODUCTS_TO_REGISTER: &str = "no products to register";
    pub const ALREADY_INITIALIZED: &str = "IAP is already initialized, but trying to initialize";
    pub const INVALID_ENVELOPE: &str = "Receipt envelope is not valid JSON";
    pub const INVALID_PAYLOAD: &str = "Receipt payload is malformed";
    pub const INVALID_SIGNATURE: &str = "Receipt signature does not verify";
    pub const INVALID_PUBLIC_KEY: &str = "Store public key is invalid";
    pub const SERVICE_STOPPED: &str = "Orchestrator service is not running";
}

#[derive(Error, Debug)]
pub enum IapError {
    #[error("Catalog load error: {0}")]
    CatalogLoad(String),

    #[error("Store is not initialized")]
    NotInitialized,

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Invalid receipt: {0}")]
    InvalidReceipt(#[from] ReceiptError),

    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    #[error("Purchase failed: {0}")]
    PurchaseFailed(PurchaseFailureReason),

    #[error("Store gateway timed out")]
    GatewayTimeout,

    #[error("Another purchase or restore is already in progress")]
    OperationInProgress,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<InitializationFailureReason> for IapError {
    fn from(reason: InitializationFailureReason) -> Self {
        IapError::InitializationFailed(reason.as_ref().to_string())
    }
}

/// Rejection of a whole receipt envelope. No part of a rejected envelope is trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("malformed receipt: {0}")]
    Malformed(String),

    #[error("unsupported store: {0}")]
    UnsupportedStore(String),

    #[error("no public key configured for {0}")]
    MissingPublicKey(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("receipt issued for {found}, expected {expected}")]
    WrongAppIdentifier { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, IapError>;
