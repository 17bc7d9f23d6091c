//! Purchase orchestrator: the store state machine.
//!
//! Drives the gateway through initialization, purchase and restore, validates
//! every receipt the store delivers, records fresh transactions in the ledger
//! and hands rewards to the reward sink.
//!
//! Each `purchase()`/`restore()` call mints an [`OperationToken`] that the
//! gateway echoes back in its events, so a callback is always matched with the
//! operation that caused it. Deliveries without a known token (pending
//! purchases the store replays at startup, late answers to operations already
//! closed) are recorded and rewarded like a purchase, minus the UI. The ledger
//! keeps them from being rewarded twice.
//!
//! The orchestrator itself is synchronous. [`OrchestratorService`] runs it on a
//! tokio task and feeds it commands, store events and deadlines.

mod service;
mod tasks;

pub use service::{OrchestratorHandle, OrchestratorService};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use tokio::time::Instant;

use crate::catalog::Catalog;
use crate::error::{IapError, Result, msg};
use crate::gateway::{
    InitializationFailureReason, ProcessingResult, ProductMetadata, PurchaseEventArgs,
    PurchaseFailureReason, StoreEvent, StoreGateway,
};
use crate::ledger::{ReceiptLedger, owns_product};
use crate::models::{OperationMode, OperationToken, RewardDescriptor};
use crate::rewards::RewardSink;
use crate::signals::{SystemMessage, UserSignals};
use crate::validator::ReceiptValidator;
use tasks::{DeferredTask, TaskQueue};

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(120);

/// How long a timed-out operation is kept past its deadline to match late
/// store events.
pub const DEFAULT_TIMED_OUT_RETENTION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
pub enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Per-call context, keyed by the call's token.
#[derive(Debug, Clone)]
struct OperationContext {
    mode: OperationMode,
    deadline: Instant,
    /// Set once the caller has been told the call timed out. Late events are
    /// still processed but produce no further UI signals.
    timed_out: bool,
}

/// What a purchase event answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub(crate) enum Delivery {
    /// A `purchase()` call still being tracked.
    Purchase(OperationToken),
    /// A replay inside a `restore()` call.
    Restore,
    /// No tracked call: store-initiated or arriving after its call was closed.
    Unsolicited,
}

impl Delivery {
    fn records(self) -> bool {
        !matches!(self, Delivery::Restore)
    }
}

/// External collaborators the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn StoreGateway>,
    pub validator: Arc<dyn ReceiptValidator>,
    pub ledger: Arc<dyn ReceiptLedger>,
    pub rewards: Arc<dyn RewardSink>,
    pub signals: Arc<dyn UserSignals>,
}

pub struct PurchaseOrchestrator {
    catalog: Catalog,
    gateway: Arc<dyn StoreGateway>,
    validator: Arc<dyn ReceiptValidator>,
    ledger: Arc<dyn ReceiptLedger>,
    rewards: Arc<dyn RewardSink>,
    signals: Arc<dyn UserSignals>,
    gateway_timeout: Duration,
    timed_out_retention: Duration,
    state: StoreState,
    init_deadline: Option<Instant>,
    last_error: Option<IapError>,
    metadata: HashMap<String, ProductMetadata>,
    operations: HashMap<OperationToken, OperationContext>,
    in_flight: Option<OperationToken>,
    tasks: TaskQueue,
}

impl PurchaseOrchestrator {
    pub fn new(catalog: Catalog, collaborators: Collaborators) -> Self {
        let Collaborators {
            gateway,
            validator,
            ledger,
            rewards,
            signals,
        } = collaborators;

        Self {
            catalog,
            gateway,
            validator,
            ledger,
            rewards,
            signals,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            timed_out_retention: DEFAULT_TIMED_OUT_RETENTION,
            state: StoreState::Uninitialized,
            init_deadline: None,
            last_error: None,
            metadata: HashMap::new(),
            operations: HashMap::new(),
            in_flight: None,
            tasks: TaskQueue::default(),
        }
    }

    /// How long a gateway call may go unanswered before it is reported as timed out.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_timed_out_retention(mut self, retention: Duration) -> Self {
        self.timed_out_retention = retention;
        self
    }

    // ============ Initialization ============

    /// Register the catalog with the store.
    ///
    /// A no-op when already initialized or initializing.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            StoreState::Ready => {
                tracing::warn!("{}", msg::ALREADY_INITIALIZED);
                return Ok(());
            }
            StoreState::Initializing => {
                tracing::warn!("IAP initialization already in progress");
                return Ok(());
            }
            StoreState::Uninitialized => {}
        }

        if self.catalog.is_empty() {
            tracing::warn!("IAP initialization skipped: {}", msg::NO_PRODUCTS_TO_REGISTER);
            return Err(IapError::InitializationFailed(
                msg::NO_PRODUCTS_TO_REGISTER.into(),
            ));
        }

        let registrations = self.catalog.registrations();
        self.state = StoreState::Initializing;
        self.init_deadline = Some(Instant::now() + self.gateway_timeout);
        self.last_error = None;

        tracing::info!("Initializing IAP with {} product(s)", registrations.len());
        self.gateway.initialize(&registrations);
        Ok(())
    }

    pub fn on_initialized(&mut self, products: Vec<ProductMetadata>) {
        if self.state == StoreState::Ready {
            tracing::warn!("Store reported initialization again; refreshing product metadata");
        }

        for product in products.iter().filter(|p| p.has_receipt) {
            tracing::info!(
                "{} already has a receipt; the store may replay it",
                product.product_id
            );
        }

        self.metadata = products
            .into_iter()
            .map(|p| (p.product_id.clone(), p))
            .collect();
        self.state = StoreState::Ready;
        self.init_deadline = None;

        tracing::info!("IAP initialized! {} product(s) available", self.metadata.len());
    }

    pub fn on_initialize_failed(
        &mut self,
        reason: InitializationFailureReason,
        message: Option<&str>,
    ) {
        match message {
            Some(message) => tracing::error!("IAP Initialize Failed : {}, {}", reason, message),
            None => tracing::error!("IAP Initialize Failed : {}", reason),
        }

        self.state = StoreState::Uninitialized;
        self.init_deadline = None;
        self.last_error = Some(reason.into());
        SystemMessage::InitializeFailed(reason).show(&*self.signals);
    }

    // ============ Purchase / restore ============

    /// Start buying `product_id`.
    ///
    /// Turns the busy indicator on. Every rejection shows its message and turns
    /// it off again before returning; otherwise the matching store event does.
    pub fn purchase(&mut self, product_id: &str) -> Result<OperationToken> {
        self.signals.show_busy_indicator(true);

        let result = self.begin_purchase(product_id);
        if result.is_err() {
            self.signals.show_busy_indicator(false);
        }
        result
    }

    fn begin_purchase(&mut self, product_id: &str) -> Result<OperationToken> {
        self.ensure_ready(OperationMode::Purchasing)?;
        self.ensure_idle(OperationMode::Purchasing)?;

        let purchasable = self.catalog.lookup_by_product_id(product_id).is_some()
            && self
                .metadata
                .get(product_id)
                .is_some_and(|m| m.available_to_purchase);
        if !purchasable {
            tracing::error!("{} does not exist or can't be bought", product_id);
            SystemMessage::PurchaseNotExistProduct.show(&*self.signals);
            return Err(IapError::ProductUnavailable(product_id.to_string()));
        }

        let token = self.begin(OperationMode::Purchasing);
        tracing::info!("Purchase {} started ({})", product_id, token);
        self.gateway.initiate_purchase(product_id, token);
        Ok(token)
    }

    /// Ask the store to re-deliver owned transactions.
    pub fn restore(&mut self) -> Result<OperationToken> {
        self.signals.show_busy_indicator(true);

        let result = self.begin_restore();
        if result.is_err() {
            self.signals.show_busy_indicator(false);
        }
        result
    }

    fn begin_restore(&mut self) -> Result<OperationToken> {
        self.ensure_ready(OperationMode::Restoring)?;
        self.ensure_idle(OperationMode::Restoring)?;

        let token = self.begin(OperationMode::Restoring);
        tracing::info!("Restore started ({})", token);
        self.gateway.restore_transactions(token);
        Ok(token)
    }

    fn ensure_ready(&mut self, mode: OperationMode) -> Result<()> {
        if self.state == StoreState::Ready {
            return Ok(());
        }

        tracing::error!(
            "IAP is not initialized, but trying to start {}",
            mode.as_ref()
        );
        let message = match mode {
            OperationMode::Purchasing => SystemMessage::PurchaseNotInitialized,
            OperationMode::Restoring => SystemMessage::RestoreNotInitialized,
        };
        message.show(&*self.signals);

        if self.state == StoreState::Uninitialized {
            if let Err(e) = self.initialize() {
                tracing::warn!("Re-initialization failed: {}", e);
            }
        }
        Err(IapError::NotInitialized)
    }

    fn ensure_idle(&self, mode: OperationMode) -> Result<()> {
        let Some(token) = self.in_flight else {
            return Ok(());
        };

        tracing::warn!(
            "{} rejected: operation {} is still in flight",
            mode.as_ref(),
            token
        );
        let message = match mode {
            OperationMode::Purchasing => SystemMessage::PurchaseOperationInProgress,
            OperationMode::Restoring => SystemMessage::RestoreOperationInProgress,
        };
        message.show(&*self.signals);
        Err(IapError::OperationInProgress)
    }

    fn begin(&mut self, mode: OperationMode) -> OperationToken {
        let token = OperationToken::new();
        self.operations.insert(
            token,
            OperationContext {
                mode,
                deadline: Instant::now() + self.gateway_timeout,
                timed_out: false,
            },
        );
        self.in_flight = Some(token);
        token
    }

    /// Close an operation: clear the in-flight slot, show `message` and turn
    /// the busy indicator off. Timed-out operations were already closed for
    /// the caller, so only the bookkeeping happens for them.
    fn finish_operation(&mut self, token: OperationToken, message: Option<SystemMessage>) {
        let Some(context) = self.operations.remove(&token) else {
            return;
        };
        if self.in_flight == Some(token) {
            self.in_flight = None;
        }

        if context.timed_out {
            tracing::debug!("Late completion of timed-out operation {}", token);
            return;
        }

        if let Some(message) = message {
            message.show(&*self.signals);
        }
        self.signals.show_busy_indicator(false);
    }

    fn delivery_of(&self, token: Option<OperationToken>) -> Delivery {
        let tracked = token.and_then(|t| self.operations.get(&t).map(|c| (t, c.mode)));
        match tracked {
            Some((token, OperationMode::Purchasing)) => Delivery::Purchase(token),
            Some((_, OperationMode::Restoring)) => Delivery::Restore,
            None => Delivery::Unsolicited,
        }
    }

    // ============ Store events ============

    /// Handle one store event, acknowledge it and run the work it queued.
    pub fn dispatch(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Initialized { products } => self.on_initialized(products),
            StoreEvent::InitializeFailed { reason, message } => {
                self.on_initialize_failed(reason, message.as_deref())
            }
            StoreEvent::Purchase(args) => match self.on_purchase_event(&args) {
                ProcessingResult::Complete => {
                    self.gateway
                        .finish_transaction(&args.product_id, &args.transaction_id);
                }
            },
            StoreEvent::PurchaseFailed {
                token,
                product_id,
                reason,
            } => self.on_purchase_failed(token, &product_id, reason),
            StoreEvent::RestoreCompleted {
                token,
                success,
                error,
            } => self.on_restore_completed(token, success, error.as_deref()),
        }

        self.run_pending_tasks();
    }

    /// Validate the envelope of a purchase event, record fresh transactions and
    /// queue the reward grant.
    ///
    /// Always returns `Complete`; an unrecoverable receipt must not be retried
    /// by the store.
    pub fn on_purchase_event(&mut self, args: &PurchaseEventArgs) -> ProcessingResult {
        let delivery = self.delivery_of(args.token);
        tracing::info!("Start {} delivery of {}!", delivery.as_ref(), args.product_id);

        let receipts = match self.validator.validate(&args.receipt) {
            Ok(receipts) => receipts,
            Err(e) => {
                tracing::error!("Invalid receipt for {}: {}", args.product_id, e);
                if let Delivery::Purchase(token) = delivery {
                    self.finish_operation(token, Some(SystemMessage::PurchaseInvalidReceipt));
                }
                return ProcessingResult::Complete;
            }
        };

        tracing::info!("Valid receipt! {} entitlement(s)", receipts.len());

        let mut rewards = Vec::new();
        let mut ledger_failed = false;
        for receipt in &receipts {
            let Some(product) = self.catalog.lookup_by_any_sku(&receipt.product_id) else {
                tracing::warn!("No catalog product for SKU {}", receipt.product_id);
                continue;
            };

            if delivery.records() {
                match self.ledger.append(receipt) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(
                            "Transaction {} already redeemed, skipping",
                            receipt.transaction_id
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to record transaction {} (SKU {}); entitlement not granted: {}",
                            receipt.transaction_id,
                            receipt.product_id,
                            e
                        );
                        ledger_failed = true;
                        continue;
                    }
                }
            }

            tracing::debug!(
                "New reward. {}, {}, {}, {}",
                product.reward.reward_type,
                product.reward.reward_id,
                product.reward.amount,
                product.product_id
            );
            rewards.push(product.reward.clone());
        }

        self.tasks.push(DeferredTask::GrantRewards {
            delivery,
            rewards,
            ledger_failed,
        });
        ProcessingResult::Complete
    }

    pub fn on_purchase_failed(
        &mut self,
        token: Option<OperationToken>,
        product_id: &str,
        reason: PurchaseFailureReason,
    ) {
        tracing::error!("Purchase {} Failed : {}", product_id, reason);

        let Some(token) = token else {
            return;
        };
        if !matches!(self.delivery_of(Some(token)), Delivery::Purchase(_)) {
            tracing::warn!("Purchase failure for unknown operation {}", token);
            return;
        }

        let message = (reason != PurchaseFailureReason::UserCancelled)
            .then_some(SystemMessage::PurchaseFailed(reason));
        self.finish_operation(token, message);
    }

    pub fn on_restore_completed(
        &mut self,
        token: OperationToken,
        success: bool,
        error: Option<&str>,
    ) {
        if !self
            .operations
            .get(&token)
            .is_some_and(|c| c.mode == OperationMode::Restoring)
        {
            tracing::warn!("Restore completion for unknown operation {}", token);
            return;
        }

        let message = if success {
            tracing::info!("Restore finished");
            SystemMessage::RestoreSuccess
        } else {
            tracing::error!("Restore failed. error : {}", error.unwrap_or("unknown"));
            SystemMessage::RestoreFailed
        };
        self.finish_operation(token, Some(message));
    }

    /// Drain the deferred work queue.
    pub fn run_pending_tasks(&mut self) {
        while let Some(task) = self.tasks.pop() {
            match task {
                DeferredTask::GrantRewards {
                    delivery,
                    rewards,
                    ledger_failed,
                } => self.grant_rewards(delivery, rewards, ledger_failed),
            }
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn grant_rewards(
        &mut self,
        delivery: Delivery,
        rewards: Vec<RewardDescriptor>,
        ledger_failed: bool,
    ) {
        tracing::info!("Start to give IAP reward. reward count : {}", rewards.len());

        match delivery {
            // Restored entitlements were granted by the original purchase.
            Delivery::Restore => {
                for reward in &rewards {
                    tracing::info!(
                        "Restored entitlement: {} ({} x{})",
                        reward.source_product_id,
                        reward.reward_id,
                        reward.amount
                    );
                }
            }
            Delivery::Purchase(token) => {
                let message = if rewards.is_empty() && ledger_failed {
                    SystemMessage::PurchaseLedgerUnavailable
                } else if rewards.is_empty() {
                    tracing::warn!("Purchase produced no reward");
                    SystemMessage::PurchaseNoReward
                } else if self.rewards.grant(&rewards, true) {
                    SystemMessage::PurchaseSuccess
                } else {
                    tracing::error!("Reward sink refused {} reward(s)", rewards.len());
                    SystemMessage::PurchaseRewardNotGranted
                };

                self.finish_operation(token, Some(message));
                tracing::info!("Purchase finished!");
            }
            Delivery::Unsolicited => {
                if rewards.is_empty() {
                    tracing::info!("Unsolicited delivery carried no new transaction");
                } else if self.rewards.grant(&rewards, true) {
                    tracing::info!(
                        "Granted {} reward(s) from an unsolicited delivery",
                        rewards.len()
                    );
                } else {
                    tracing::error!(
                        "Reward sink refused {} reward(s) from an unsolicited delivery",
                        rewards.len()
                    );
                }
            }
        }
    }

    // ============ Timeouts ============

    /// Earliest pending deadline, if anything is waiting on the store or a
    /// timed-out operation is due to be dropped.
    pub fn next_deadline(&self) -> Option<Instant> {
        let init = self
            .init_deadline
            .filter(|_| self.state == StoreState::Initializing);

        self.operations
            .values()
            .map(|c| self.due_at(c))
            .chain(init)
            .min()
    }

    fn due_at(&self, context: &OperationContext) -> Instant {
        if context.timed_out {
            context.deadline + self.timed_out_retention
        } else {
            context.deadline
        }
    }

    /// Time out every call whose deadline is at or before `now`, and drop
    /// timed-out calls whose retention has run out.
    pub fn expire_overdue(&mut self, now: Instant) {
        if self.state == StoreState::Initializing && self.init_deadline.is_some_and(|d| d <= now)
        {
            tracing::warn!("IAP initialization timed out");
            self.state = StoreState::Uninitialized;
            self.init_deadline = None;
            self.last_error = Some(IapError::GatewayTimeout);
        }

        let overdue: Vec<(OperationToken, OperationMode)> = self
            .operations
            .iter()
            .filter(|(_, c)| !c.timed_out && c.deadline <= now)
            .map(|(token, c)| (*token, c.mode))
            .collect();

        for (token, mode) in overdue {
            tracing::warn!("{} {} timed out", mode.as_ref(), token);

            if let Some(context) = self.operations.get_mut(&token) {
                context.timed_out = true;
            }
            if self.in_flight == Some(token) {
                self.in_flight = None;
            }

            let message = match mode {
                OperationMode::Purchasing => SystemMessage::PurchaseGatewayTimeout,
                OperationMode::Restoring => SystemMessage::RestoreGatewayTimeout,
            };
            message.show(&*self.signals);
            self.signals.show_busy_indicator(false);
        }

        // Late events for dropped calls are handled as unsolicited deliveries.
        let retention = self.timed_out_retention;
        self.operations.retain(|token, c| {
            let keep = !c.timed_out || c.deadline + retention > now;
            if !keep {
                tracing::debug!("Dropping timed-out operation {}", token);
            }
            keep
        });
    }

    // ============ Queries ============

    /// True iff the ledger holds a receipt for any of the product's store SKUs.
    ///
    /// Unknown products and ledger failures read as not purchased.
    pub fn already_purchased(&self, product_id: &str) -> bool {
        let Some(product) = self.catalog.lookup_by_product_id(product_id) else {
            tracing::debug!("already_purchased: unknown product {}", product_id);
            return false;
        };

        match owns_product(&*self.ledger, product) {
            Ok(owned) => owned,
            Err(e) => {
                tracing::error!("Failed to read receipt ledger: {}", e);
                false
            }
        }
    }

    /// Store-reported price, e.g. `"0.99 USD"`.
    pub fn price_label(&self, product_id: &str) -> Option<String> {
        self.metadata
            .get(product_id)
            .map(|m| format!("{} {}", m.localized_price, m.iso_currency_code))
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == StoreState::Ready
    }

    /// Mode of the operation currently in flight.
    pub fn in_flight(&self) -> Option<OperationMode> {
        self.in_flight
            .and_then(|t| self.operations.get(&t))
            .map(|c| c.mode)
    }

    /// Operations still tracked, including timed-out ones within retention.
    pub fn tracked_operations(&self) -> usize {
        self.operations.len()
    }

    /// Why the last initialization attempt failed.
    pub fn last_error(&self) -> Option<&IapError> {
        self.last_error.as_ref()
    }

    pub fn product_metadata(&self, product_id: &str) -> Option<&ProductMetadata> {
        self.metadata.get(product_id)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl std::fmt::Debug for PurchaseOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseOrchestrator")
            .field("state", &self.state)
            .field("products", &self.catalog.len())
            .field("in_flight", &self.in_flight)
            .field("pending_tasks", &self.tasks.len())
            .finish()
    }
}
