//! Store gateway: the platform billing SDK seen from the orchestrator.
//!
//! Calls into the gateway are fire-and-forget. Every outcome comes back later
//! as a [`StoreEvent`] on the channel the gateway was constructed with.

mod sandbox;

pub use sandbox::{SandboxBehavior, SandboxGateway};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use tokio::sync::mpsc;

use crate::models::{OperationToken, ProductRegistration, RawReceiptEnvelope};

pub type EventSender = mpsc::UnboundedSender<StoreEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub trait StoreGateway: Send + Sync {
    /// Register the catalog. Answers with `Initialized` or `InitializeFailed`.
    fn initialize(&self, products: &[ProductRegistration]);

    /// Start a purchase. Answers with `Purchase` or `PurchaseFailed` carrying `token`.
    fn initiate_purchase(&self, product_id: &str, token: OperationToken);

    /// Re-deliver owned transactions as `Purchase` events, then `RestoreCompleted`.
    fn restore_transactions(&self, token: OperationToken);

    /// Acknowledge a processed purchase event so the store stops re-delivering it.
    fn finish_transaction(&self, product_id: &str, transaction_id: &str);
}

/// Live metadata the store reports for a registered product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub product_id: String,
    pub available_to_purchase: bool,
    pub localized_price: String,
    pub iso_currency_code: String,
    pub has_receipt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
pub enum InitializationFailureReason {
    PurchasingUnavailable,
    NoProductsAvailable,
    AppNotKnown,
}

impl std::fmt::Display for InitializationFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
pub enum PurchaseFailureReason {
    PurchasingUnavailable,
    ExistingPurchasePending,
    ProductUnavailable,
    SignatureInvalid,
    UserCancelled,
    PaymentDeclined,
    DuplicateTransaction,
    Unknown,
}

impl std::fmt::Display for PurchaseFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A purchase the store asks the app to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseEventArgs {
    /// Token of the call that caused this event. `None` for transactions the
    /// store delivers on its own (pending purchases replayed at startup).
    pub token: Option<OperationToken>,
    pub product_id: String,
    pub transaction_id: String,
    pub receipt: RawReceiptEnvelope,
}

/// Result the app hands back for a processed purchase event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingResult {
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Initialized {
        products: Vec<ProductMetadata>,
    },
    InitializeFailed {
        reason: InitializationFailureReason,
        message: Option<String>,
    },
    Purchase(PurchaseEventArgs),
    PurchaseFailed {
        token: Option<OperationToken>,
        product_id: String,
        reason: PurchaseFailureReason,
    },
    RestoreCompleted {
        token: OperationToken,
        success: bool,
        error: Option<String>,
    },
}
