//! In-process store for development builds and tests.
//!
//! Approves every purchase, signs receipts with a development key and replays
//! owned non-consumables on restore. Behaviour can be scripted to fail or to
//! never answer.

use std::sync::Mutex;

use chrono::Utc;

use super::{
    EventSender, InitializationFailureReason, ProductMetadata, PurchaseEventArgs,
    PurchaseFailureReason, StoreEvent, StoreGateway,
};
use crate::error::Result;
use crate::models::{OperationToken, ProductKind, ProductRegistration, RawReceiptEnvelope, Store};
use crate::validator::signing::ReceiptSigner;
use crate::validator::{AppleInAppPurchase, AppleReceiptClaims, GooglePurchaseData};

/// Scripted responses. The default approves everything.
#[derive(Debug, Clone, Default)]
pub struct SandboxBehavior {
    pub fail_initialize: Option<InitializationFailureReason>,
    pub fail_purchase: Option<PurchaseFailureReason>,
    pub fail_restore: Option<String>,
    /// Catalog IDs reported as not available to purchase
    pub unavailable: Vec<String>,
    /// Swallow every call without answering
    pub silent: bool,
}

#[derive(Debug, Clone)]
struct OwnedTransaction {
    product_id: String,
    sku: String,
    transaction_id: String,
    purchase_time_ms: i64,
}

#[derive(Debug, Default)]
struct SandboxState {
    registered: Vec<ProductRegistration>,
    owned: Vec<OwnedTransaction>,
    finished: Vec<String>,
    next_order: u64,
}

pub struct SandboxGateway {
    events: EventSender,
    signer: ReceiptSigner,
    store: Store,
    app_identifier: String,
    behavior: Mutex<SandboxBehavior>,
    state: Mutex<SandboxState>,
}

impl SandboxGateway {
    pub fn new(events: EventSender, signer: ReceiptSigner, store: Store, app_identifier: &str) -> Self {
        Self {
            events,
            signer,
            store,
            app_identifier: app_identifier.to_string(),
            behavior: Mutex::new(SandboxBehavior::default()),
            state: Mutex::new(SandboxState::default()),
        }
    }

    pub fn with_behavior(self, behavior: SandboxBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn set_behavior(&self, behavior: SandboxBehavior) {
        if let Ok(mut b) = self.behavior.lock() {
            *b = behavior;
        }
    }

    pub fn store(&self) -> Store {
        self.store
    }

    /// Public key matching the receipts this sandbox signs.
    pub fn public_key_base64(&self) -> String {
        self.signer.public_key_base64()
    }

    /// Transactions acknowledged with `finish_transaction`, in order.
    pub fn finished_transactions(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.finished.clone())
            .unwrap_or_default()
    }

    fn behavior(&self) -> SandboxBehavior {
        self.behavior.lock().map(|b| b.clone()).unwrap_or_default()
    }

    fn emit(&self, event: StoreEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("Sandbox store: event receiver dropped");
        }
    }

    fn sign(&self, owned: &OwnedTransaction) -> Result<RawReceiptEnvelope> {
        match self.store {
            Store::GooglePlay => self.signer.sign_google(&GooglePurchaseData {
                order_id: owned.transaction_id.clone(),
                package_name: self.app_identifier.clone(),
                product_id: owned.sku.clone(),
                purchase_time: owned.purchase_time_ms,
                purchase_token: format!("sandbox-{}", owned.transaction_id),
            }),
            Store::AppleAppStore => self.signer.sign_apple(
                &AppleReceiptClaims {
                    bundle_id: self.app_identifier.clone(),
                    in_app: vec![AppleInAppPurchase {
                        product_id: owned.sku.clone(),
                        transaction_id: owned.transaction_id.clone(),
                        purchase_date_ms: owned.purchase_time_ms,
                    }],
                },
                &owned.transaction_id,
            ),
        }
    }

    fn purchase_event(&self, owned: &OwnedTransaction, token: OperationToken) -> StoreEvent {
        match self.sign(owned) {
            Ok(receipt) => StoreEvent::Purchase(PurchaseEventArgs {
                token: Some(token),
                product_id: owned.product_id.clone(),
                transaction_id: owned.transaction_id.clone(),
                receipt,
            }),
            Err(e) => {
                tracing::error!("Sandbox store: failed to sign receipt: {}", e);
                StoreEvent::PurchaseFailed {
                    token: Some(token),
                    product_id: owned.product_id.clone(),
                    reason: PurchaseFailureReason::Unknown,
                }
            }
        }
    }
}

impl StoreGateway for SandboxGateway {
    fn initialize(&self, products: &[ProductRegistration]) {
        let behavior = self.behavior();
        if behavior.silent {
            return;
        }

        if let Some(reason) = behavior.fail_initialize {
            self.emit(StoreEvent::InitializeFailed {
                reason,
                message: Some("sandbox store configured to fail".into()),
            });
            return;
        }

        let metadata = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.registered = products.to_vec();

            products
                .iter()
                .map(|p| ProductMetadata {
                    product_id: p.product_id.clone(),
                    available_to_purchase: p.skus.contains_key(&self.store)
                        && !behavior.unavailable.contains(&p.product_id),
                    localized_price: "0.99".into(),
                    iso_currency_code: "USD".into(),
                    has_receipt: state.owned.iter().any(|o| o.product_id == p.product_id),
                })
                .collect()
        };

        tracing::info!("Sandbox store initialized ({})", self.store);
        self.emit(StoreEvent::Initialized { products: metadata });
    }

    fn initiate_purchase(&self, product_id: &str, token: OperationToken) {
        let behavior = self.behavior();
        if behavior.silent {
            return;
        }

        if let Some(reason) = behavior.fail_purchase {
            self.emit(StoreEvent::PurchaseFailed {
                token: Some(token),
                product_id: product_id.to_string(),
                reason,
            });
            return;
        }

        let owned = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };

            let registration = state
                .registered
                .iter()
                .find(|r| r.product_id == product_id)
                .cloned();

            let Some((registration, sku)) = registration
                .and_then(|r| r.skus.get(&self.store).cloned().map(|sku| (r, sku)))
            else {
                drop(state);
                self.emit(StoreEvent::PurchaseFailed {
                    token: Some(token),
                    product_id: product_id.to_string(),
                    reason: PurchaseFailureReason::ProductUnavailable,
                });
                return;
            };

            state.next_order += 1;
            let owned = OwnedTransaction {
                product_id: registration.product_id.clone(),
                sku,
                transaction_id: format!("SANDBOX.{:04}", state.next_order),
                purchase_time_ms: Utc::now().timestamp_millis(),
            };

            if registration.kind != ProductKind::Consumable {
                state.owned.push(owned.clone());
            }
            owned
        };

        tracing::info!(
            "Sandbox purchase: {} ({})",
            owned.product_id,
            owned.transaction_id
        );
        let event = self.purchase_event(&owned, token);
        self.emit(event);
    }

    fn restore_transactions(&self, token: OperationToken) {
        let behavior = self.behavior();
        if behavior.silent {
            return;
        }

        if let Some(error) = behavior.fail_restore {
            self.emit(StoreEvent::RestoreCompleted {
                token,
                success: false,
                error: Some(error),
            });
            return;
        }

        let owned = self
            .state
            .lock()
            .map(|s| s.owned.clone())
            .unwrap_or_default();

        tracing::info!("Sandbox restore: {} owned transaction(s)", owned.len());
        for transaction in &owned {
            let event = self.purchase_event(transaction, token);
            self.emit(event);
        }

        self.emit(StoreEvent::RestoreCompleted {
            token,
            success: true,
            error: None,
        });
    }

    fn finish_transaction(&self, product_id: &str, transaction_id: &str) {
        tracing::debug!("Sandbox store: finished {} ({})", product_id, transaction_id);
        if let Ok(mut state) = self.state.lock() {
            state.finished.push(transaction_id.to_string());
        }
    }
}

impl std::fmt::Debug for SandboxGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxGateway")
            .field("store", &self.store)
            .field("app_identifier", &self.app_identifier)
            .finish()
    }
}
