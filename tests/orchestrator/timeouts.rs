//! Deadlines on calls the store never answers.

use std::time::Duration;

use tokio::time::Instant;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const PAST_DEADLINE: Duration = Duration::from_secs(121);

#[test]
fn test_unanswered_purchase_times_out() {
    let mut h = Harness::ready();
    h.orchestrator.purchase("gem_100").unwrap();

    h.orchestrator.expire_overdue(Instant::now() + PAST_DEADLINE);

    assert_eq!(h.signals.titles(), vec!["PurchaseFailed_GatewayTimeout"]);
    assert_eq!(h.signals.busy(true), 1);
    assert_eq!(h.signals.busy(false), 1);
    assert_eq!(h.orchestrator.in_flight(), None);
    // Only the retention of the timed-out call is pending
    assert!(
        h.orchestrator
            .next_deadline()
            .is_some_and(|d| d > Instant::now() + PAST_DEADLINE)
    );

    // The slot is free again
    assert!(h.orchestrator.purchase("gem_500").is_ok());
}

#[test]
fn test_deadline_not_reached_keeps_operation_open() {
    let mut h = Harness::ready();
    h.orchestrator.purchase("gem_100").unwrap();

    h.orchestrator.expire_overdue(Instant::now());

    assert_eq!(h.orchestrator.in_flight(), Some(OperationMode::Purchasing));
    assert!(h.signals.titles().is_empty());
    assert!(h.orchestrator.next_deadline().is_some());
}

#[test]
fn test_late_delivery_after_timeout_is_still_redeemed_silently() {
    let mut h = Harness::ready();
    let token = h.orchestrator.purchase("gem_100").unwrap();
    h.orchestrator.expire_overdue(Instant::now() + PAST_DEADLINE);
    h.signals.clear();

    let receipt = h.google_receipt("g100", "GPA.late");
    h.orchestrator
        .dispatch(purchase_event(Some(token), "gem_100", "GPA.late", receipt));

    assert!(h.orchestrator.already_purchased("gem_100"));
    assert_eq!(h.rewards.grants().len(), 1);
    assert!(h.signals.signals().is_empty());
    assert_eq!(h.gateway.finished(), vec!["GPA.late"]);
}

#[test]
fn test_late_failure_after_timeout_is_silent() {
    let mut h = Harness::ready();
    let token = h.orchestrator.purchase("gem_100").unwrap();
    h.orchestrator.expire_overdue(Instant::now() + PAST_DEADLINE);
    h.signals.clear();

    h.orchestrator.dispatch(StoreEvent::PurchaseFailed {
        token: Some(token),
        product_id: "gem_100".into(),
        reason: PurchaseFailureReason::PaymentDeclined,
    });

    assert!(h.signals.signals().is_empty());
}

#[test]
fn test_unanswered_restore_times_out() {
    let mut h = Harness::ready();
    let token = h.orchestrator.restore().unwrap();

    h.orchestrator.expire_overdue(Instant::now() + PAST_DEADLINE);
    assert_eq!(h.signals.titles(), vec!["RestoreFailed_GatewayTimeout"]);
    assert_eq!(h.signals.busy(false), 1);

    h.orchestrator.dispatch(StoreEvent::RestoreCompleted {
        token,
        success: true,
        error: None,
    });
    assert_eq!(h.signals.busy(false), 1);
    assert_eq!(h.signals.titles(), vec!["RestoreFailed_GatewayTimeout"]);
}

#[test]
fn test_unanswered_initialization_returns_to_uninitialized() {
    let mut h = Harness::new();
    h.orchestrator.initialize().unwrap();

    h.orchestrator.expire_overdue(Instant::now() + PAST_DEADLINE);

    assert_eq!(h.orchestrator.state(), StoreState::Uninitialized);
    assert!(matches!(
        h.orchestrator.last_error(),
        Some(IapError::GatewayTimeout)
    ));
    assert!(h.signals.signals().is_empty());

    h.orchestrator.initialize().unwrap();
    assert_eq!(h.gateway.initialize_calls(), 2);
}

#[test]
fn test_custom_timeout_is_honoured() {
    let mut h = Harness::new().with_gateway_timeout(Duration::from_secs(5));
    h.make_ready();

    h.orchestrator.purchase("gem_100").unwrap();
    h.orchestrator
        .expire_overdue(Instant::now() + Duration::from_secs(6));

    assert_eq!(h.signals.titles(), vec!["PurchaseFailed_GatewayTimeout"]);
}

#[test]
fn test_timed_out_operations_are_dropped_after_retention() {
    let mut h = Harness::new().with_gateway_timeout(Duration::from_secs(1));
    h.orchestrator = h
        .orchestrator
        .with_timed_out_retention(Duration::from_secs(2));
    h.make_ready();

    for _ in 0..50 {
        h.orchestrator.purchase("gem_100").unwrap();
        h.orchestrator
            .expire_overdue(Instant::now() + Duration::from_secs(5));
    }

    assert_eq!(h.orchestrator.tracked_operations(), 0);
    assert!(h.orchestrator.next_deadline().is_none());
    assert_eq!(h.signals.busy(true), 50);
    assert_eq!(h.signals.busy(false), 50);
}

#[test]
fn test_timed_out_operation_is_kept_until_retention_runs_out() {
    let mut h = Harness::ready();
    h.orchestrator.purchase("gem_100").unwrap();

    h.orchestrator.expire_overdue(Instant::now() + PAST_DEADLINE);
    assert_eq!(h.orchestrator.tracked_operations(), 1);

    h.orchestrator
        .expire_overdue(Instant::now() + PAST_DEADLINE + Duration::from_secs(600));
    assert_eq!(h.orchestrator.tracked_operations(), 0);
}

#[test]
fn test_delivery_after_retention_is_still_redeemed() {
    let mut h = Harness::new().with_gateway_timeout(Duration::from_secs(1));
    h.orchestrator = h
        .orchestrator
        .with_timed_out_retention(Duration::from_secs(1));
    h.make_ready();

    let token = h.orchestrator.purchase("gem_100").unwrap();
    h.orchestrator
        .expire_overdue(Instant::now() + Duration::from_secs(5));
    assert_eq!(h.orchestrator.tracked_operations(), 0);
    h.signals.clear();

    let receipt = h.google_receipt("g100", "GPA.dropped");
    h.orchestrator
        .dispatch(purchase_event(Some(token), "gem_100", "GPA.dropped", receipt));

    assert!(h.orchestrator.already_purchased("gem_100"));
    assert_eq!(h.rewards.grants().len(), 1);
    assert!(h.signals.signals().is_empty());
    assert_eq!(h.gateway.finished(), vec!["GPA.dropped"]);
}
