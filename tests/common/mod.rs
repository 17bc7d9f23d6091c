//! Test utilities and fixtures for iapkit integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

pub use iapkit::catalog::Catalog;
pub use iapkit::error::{IapError, ReceiptError};
pub use iapkit::gateway::{
    InitializationFailureReason, ProductMetadata, PurchaseEventArgs, PurchaseFailureReason,
    StoreEvent, StoreGateway,
};
pub use iapkit::ledger::{MemoryLedger, ReceiptLedger};
pub use iapkit::models::*;
pub use iapkit::orchestrator::{Collaborators, PurchaseOrchestrator, StoreState};
pub use iapkit::rewards::RewardSink;
pub use iapkit::signals::UserSignals;
pub use iapkit::validator::signing::ReceiptSigner;
pub use iapkit::validator::{
    AppleInAppPurchase, AppleReceiptClaims, CrossPlatformValidator, GooglePurchaseData, StoreKeys,
};

pub const APP_ID: &str = "com.example.game";

pub const CATALOG_CSV: &str = "\
productID,googleID,appleID,productType,rewardType,rewardID,rewardAmount
gem_100,g100,a100,0,currency,gem,100
gem_500,g500,a500,0,currency,gem,500
no_ads,g_noads,a_noads,1,feature,no_ads,1
";

pub fn test_catalog() -> Catalog {
    Catalog::load(CATALOG_CSV.as_bytes()).expect("Failed to load test catalog")
}

/// Deterministic store key (ONLY for testing!)
pub fn test_signer() -> ReceiptSigner {
    ReceiptSigner::from_bytes(&[7u8; 32]).expect("Failed to create test signer")
}

/// Validator trusting `signer` for both stores.
pub fn validator_for(signer: &ReceiptSigner) -> CrossPlatformValidator {
    let key = signer.public_key_base64();
    CrossPlatformValidator::new(
        &StoreKeys {
            google: Some(key.clone()),
            apple: Some(key),
        },
        APP_ID,
    )
    .expect("Failed to create validator")
}

pub fn google_receipt(signer: &ReceiptSigner, sku: &str, transaction_id: &str) -> RawReceiptEnvelope {
    signer
        .sign_google(&GooglePurchaseData {
            order_id: transaction_id.to_string(),
            package_name: APP_ID.to_string(),
            product_id: sku.to_string(),
            purchase_time: 1_700_000_000_000,
            purchase_token: format!("token-{}", transaction_id),
        })
        .expect("Failed to sign Google receipt")
}

/// Apple receipt bundling one entry per `(sku, transaction_id)`.
pub fn apple_receipt(signer: &ReceiptSigner, entries: &[(&str, &str)]) -> RawReceiptEnvelope {
    let in_app = entries
        .iter()
        .map(|(sku, tx)| AppleInAppPurchase {
            product_id: sku.to_string(),
            transaction_id: tx.to_string(),
            purchase_date_ms: 1_700_000_000_000,
        })
        .collect();

    signer
        .sign_apple(
            &AppleReceiptClaims {
                bundle_id: APP_ID.to_string(),
                in_app,
            },
            entries.last().map(|(_, tx)| *tx).unwrap_or("empty"),
        )
        .expect("Failed to sign Apple receipt")
}

pub fn purchase_event(
    token: Option<OperationToken>,
    product_id: &str,
    transaction_id: &str,
    receipt: RawReceiptEnvelope,
) -> StoreEvent {
    StoreEvent::Purchase(PurchaseEventArgs {
        token,
        product_id: product_id.to_string(),
        transaction_id: transaction_id.to_string(),
        receipt,
    })
}

/// Metadata reporting every catalog product as purchasable.
pub fn available_metadata(catalog: &Catalog) -> Vec<ProductMetadata> {
    catalog
        .products()
        .iter()
        .map(|p| ProductMetadata {
            product_id: p.product_id.clone(),
            available_to_purchase: true,
            localized_price: "0.99".into(),
            iso_currency_code: "USD".into(),
            has_receipt: false,
        })
        .collect()
}

// ============================================================================
// Recording collaborators
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Initialize(Vec<String>),
    Purchase(String, OperationToken),
    Restore(OperationToken),
    Finish(String),
}

/// Gateway that records calls and never answers.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
}

impl RecordingGateway {
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn initialize_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Initialize(_)))
            .count()
    }

    pub fn purchase_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Purchase(..)))
            .count()
    }

    pub fn finished(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Finish(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StoreGateway for RecordingGateway {
    fn initialize(&self, products: &[ProductRegistration]) {
        self.record(GatewayCall::Initialize(
            products.iter().map(|p| p.product_id.clone()).collect(),
        ));
    }

    fn initiate_purchase(&self, product_id: &str, token: OperationToken) {
        self.record(GatewayCall::Purchase(product_id.to_string(), token));
    }

    fn restore_transactions(&self, token: OperationToken) {
        self.record(GatewayCall::Restore(token));
    }

    fn finish_transaction(&self, _product_id: &str, transaction_id: &str) {
        self.record(GatewayCall::Finish(transaction_id.to_string()));
    }
}

#[derive(Debug)]
pub struct RecordingRewardSink {
    grants: Mutex<Vec<(Vec<RewardDescriptor>, bool)>>,
    accept: bool,
}

impl RecordingRewardSink {
    pub fn new() -> Self {
        Self {
            grants: Mutex::new(Vec::new()),
            accept: true,
        }
    }

    pub fn refusing() -> Self {
        Self {
            grants: Mutex::new(Vec::new()),
            accept: false,
        }
    }

    pub fn grants(&self) -> Vec<(Vec<RewardDescriptor>, bool)> {
        self.grants.lock().unwrap().clone()
    }
}

impl RewardSink for RecordingRewardSink {
    fn grant(&self, rewards: &[RewardDescriptor], is_real_purchase: bool) -> bool {
        self.grants
            .lock()
            .unwrap()
            .push((rewards.to_vec(), is_real_purchase));
        self.accept
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Busy(bool),
    Message {
        is_error: bool,
        title: String,
        body: String,
    },
}

#[derive(Debug, Default)]
pub struct RecordingSignals {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingSignals {
    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.signals.lock().unwrap().clear();
    }

    pub fn busy(&self, visible: bool) -> usize {
        self.signals()
            .iter()
            .filter(|s| **s == Signal::Busy(visible))
            .count()
    }

    pub fn titles(&self) -> Vec<String> {
        self.signals()
            .into_iter()
            .filter_map(|s| match s {
                Signal::Message { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }
}

impl UserSignals for RecordingSignals {
    fn show_busy_indicator(&self, visible: bool) {
        self.signals.lock().unwrap().push(Signal::Busy(visible));
    }

    fn show_system_message(&self, is_error: bool, title_key: &str, body_key: &str) {
        self.signals.lock().unwrap().push(Signal::Message {
            is_error,
            title: title_key.to_string(),
            body: body_key.to_string(),
        });
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Orchestrator wired to recording collaborators and an in-memory ledger.
pub struct Harness {
    pub orchestrator: PurchaseOrchestrator,
    pub gateway: Arc<RecordingGateway>,
    pub ledger: Arc<MemoryLedger>,
    pub rewards: Arc<RecordingRewardSink>,
    pub signals: Arc<RecordingSignals>,
    pub signer: ReceiptSigner,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_catalog(), RecordingRewardSink::new())
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        Self::build(catalog, RecordingRewardSink::new())
    }

    pub fn with_rewards(rewards: RecordingRewardSink) -> Self {
        Self::build(test_catalog(), rewards)
    }

    fn build(catalog: Catalog, rewards: RecordingRewardSink) -> Self {
        let gateway = Arc::new(RecordingGateway::default());
        let ledger = Arc::new(MemoryLedger::new());
        let rewards = Arc::new(rewards);
        let signals = Arc::new(RecordingSignals::default());
        let signer = test_signer();

        let orchestrator = PurchaseOrchestrator::new(
            catalog,
            Collaborators {
                gateway: gateway.clone(),
                validator: Arc::new(validator_for(&signer)),
                ledger: ledger.clone(),
                rewards: rewards.clone(),
                signals: signals.clone(),
            },
        );

        Self {
            orchestrator,
            gateway,
            ledger,
            rewards,
            signals,
            signer,
        }
    }

    pub fn with_gateway_timeout(self, timeout: std::time::Duration) -> Self {
        Self {
            orchestrator: self.orchestrator.with_gateway_timeout(timeout),
            ..self
        }
    }

    /// Initialized with every product purchasable, signals cleared.
    pub fn ready() -> Self {
        let mut harness = Self::new();
        harness.make_ready();
        harness
    }

    pub fn make_ready(&mut self) {
        self.orchestrator
            .initialize()
            .expect("Failed to initialize orchestrator");
        let metadata = available_metadata(self.orchestrator.catalog());
        self.orchestrator
            .dispatch(StoreEvent::Initialized { products: metadata });
        self.signals.clear();
    }

    pub fn google_receipt(&self, sku: &str, transaction_id: &str) -> RawReceiptEnvelope {
        google_receipt(&self.signer, sku, transaction_id)
    }

    pub fn apple_receipt(&self, entries: &[(&str, &str)]) -> RawReceiptEnvelope {
        apple_receipt(&self.signer, entries)
    }

    /// Buy `product_id` and answer with a Google receipt for `sku`.
    pub fn buy(&mut self, product_id: &str, sku: &str, transaction_id: &str) -> OperationToken {
        let token = self
            .orchestrator
            .purchase(product_id)
            .expect("Failed to start purchase");
        let receipt = self.google_receipt(sku, transaction_id);
        self.orchestrator.dispatch(purchase_event(
            Some(token),
            product_id,
            transaction_id,
            receipt,
        ));
        token
    }
}
