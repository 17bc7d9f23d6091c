//! User-facing signals: the busy indicator and localized system messages.
//!
//! Messages are identified by localization keys. The body key is always the
//! title key followed by `_Description`.

use crate::gateway::{InitializationFailureReason, PurchaseFailureReason};

/// UI surface the orchestrator reports to.
pub trait UserSignals: Send + Sync {
    fn show_busy_indicator(&self, visible: bool);

    fn show_system_message(&self, is_error: bool, title_key: &str, body_key: &str);
}

/// Terminal outcome of an operation, as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessage {
    PurchaseSuccess,
    PurchaseNotInitialized,
    PurchaseNotExistProduct,
    PurchaseInvalidReceipt,
    PurchaseFailed(PurchaseFailureReason),
    PurchaseOperationInProgress,
    PurchaseGatewayTimeout,
    PurchaseRewardNotGranted,
    PurchaseNoReward,
    PurchaseLedgerUnavailable,
    RestoreSuccess,
    RestoreFailed,
    RestoreNotInitialized,
    RestoreOperationInProgress,
    RestoreGatewayTimeout,
    InitializeFailed(InitializationFailureReason),
}

impl SystemMessage {
    pub fn title_key(&self) -> String {
        match self {
            SystemMessage::PurchaseSuccess => "PurchaseSuccess".into(),
            SystemMessage::PurchaseNotInitialized => "PurchaseFailed_NotInitialized".into(),
            SystemMessage::PurchaseNotExistProduct => "PurchaseFailed_NotExistProduct".into(),
            SystemMessage::PurchaseInvalidReceipt => "PurchaseFailed_InvalidReceipt".into(),
            SystemMessage::PurchaseFailed(reason) => format!("PurchaseFailed_{}", reason),
            SystemMessage::PurchaseOperationInProgress => {
                "PurchaseFailed_OperationInProgress".into()
            }
            SystemMessage::PurchaseGatewayTimeout => "PurchaseFailed_GatewayTimeout".into(),
            SystemMessage::PurchaseRewardNotGranted => "PurchaseFailed_RewardNotGranted".into(),
            SystemMessage::PurchaseNoReward => "PurchaseFailed_NoReward".into(),
            SystemMessage::PurchaseLedgerUnavailable => "PurchaseFailed_LedgerUnavailable".into(),
            SystemMessage::RestoreSuccess => "RestoreSuccess".into(),
            SystemMessage::RestoreFailed => "RestoreFailed".into(),
            SystemMessage::RestoreNotInitialized => "RestoreFailed_NotInitialized".into(),
            SystemMessage::RestoreOperationInProgress => "RestoreFailed_OperationInProgress".into(),
            SystemMessage::RestoreGatewayTimeout => "RestoreFailed_GatewayTimeout".into(),
            SystemMessage::InitializeFailed(reason) => format!("InitializeFailed_{}", reason),
        }
    }

    pub fn body_key(&self) -> String {
        format!("{}_Description", self.title_key())
    }

    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            SystemMessage::PurchaseSuccess | SystemMessage::RestoreSuccess
        )
    }

    /// Send this message through `signals`.
    pub fn show(&self, signals: &dyn UserSignals) {
        signals.show_system_message(self.is_error(), &self.title_key(), &self.body_key());
    }
}

/// Signals that only log. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSignals;

impl UserSignals for TracingSignals {
    fn show_busy_indicator(&self, visible: bool) {
        tracing::debug!("Busy indicator: {}", if visible { "on" } else { "off" });
    }

    fn show_system_message(&self, is_error: bool, title_key: &str, body_key: &str) {
        if is_error {
            tracing::warn!("System message: {} ({})", title_key, body_key);
        } else {
            tracing::info!("System message: {} ({})", title_key, body_key);
        }
    }
}
