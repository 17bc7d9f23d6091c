//! Initialization: registration, repeated calls, failures and automatic re-init.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[test]
fn test_initialize_registers_every_product_in_catalog_order() {
    let mut h = Harness::new();

    h.orchestrator.initialize().unwrap();

    assert_eq!(h.orchestrator.state(), StoreState::Initializing);
    assert_eq!(
        h.gateway.calls(),
        vec![GatewayCall::Initialize(vec![
            "gem_100".into(),
            "gem_500".into(),
            "no_ads".into(),
        ])]
    );
}

#[test]
fn test_initialized_event_makes_store_ready() {
    let mut h = Harness::new();
    h.orchestrator.initialize().unwrap();

    let metadata = available_metadata(h.orchestrator.catalog());
    h.orchestrator
        .dispatch(StoreEvent::Initialized { products: metadata });

    assert_eq!(h.orchestrator.state(), StoreState::Ready);
    assert!(h.orchestrator.is_ready());
    assert!(h.orchestrator.product_metadata("gem_500").is_some());
    assert!(h.orchestrator.last_error().is_none());
}

#[test]
fn test_initialize_when_ready_is_a_no_op() {
    let mut h = Harness::ready();

    h.orchestrator.initialize().unwrap();

    assert_eq!(h.orchestrator.state(), StoreState::Ready);
    assert_eq!(h.gateway.initialize_calls(), 1);
}

#[test]
fn test_initialize_while_initializing_is_a_no_op() {
    let mut h = Harness::new();

    h.orchestrator.initialize().unwrap();
    h.orchestrator.initialize().unwrap();

    assert_eq!(h.orchestrator.state(), StoreState::Initializing);
    assert_eq!(h.gateway.initialize_calls(), 1);
}

#[test]
fn test_empty_catalog_cannot_initialize() {
    let mut h = Harness::with_catalog(Catalog::from_products(vec![]).unwrap());

    let err = h.orchestrator.initialize().unwrap_err();

    assert!(matches!(err, IapError::InitializationFailed(_)));
    assert_eq!(h.orchestrator.state(), StoreState::Uninitialized);
    assert!(h.gateway.calls().is_empty());
}

#[test]
fn test_initialize_failure_surfaces_reason_and_allows_retry() {
    let mut h = Harness::new();
    h.orchestrator.initialize().unwrap();

    h.orchestrator.dispatch(StoreEvent::InitializeFailed {
        reason: InitializationFailureReason::AppNotKnown,
        message: Some("bundle not registered".into()),
    });

    assert_eq!(h.orchestrator.state(), StoreState::Uninitialized);
    assert_eq!(h.signals.titles(), vec!["InitializeFailed_AppNotKnown"]);
    assert!(matches!(
        h.orchestrator.last_error(),
        Some(IapError::InitializationFailed(reason)) if reason == "AppNotKnown"
    ));

    // Explicit failure re-opens initialization
    h.orchestrator.initialize().unwrap();
    assert_eq!(h.orchestrator.state(), StoreState::Initializing);
    assert_eq!(h.gateway.initialize_calls(), 2);
}

#[test]
fn test_purchase_before_ready_kicks_initialization() {
    let mut h = Harness::new();

    let err = h.orchestrator.purchase("gem_100").unwrap_err();

    assert!(matches!(err, IapError::NotInitialized));
    assert_eq!(h.signals.titles(), vec!["PurchaseFailed_NotInitialized"]);
    assert_eq!(h.signals.busy(true), 1);
    assert_eq!(h.signals.busy(false), 1);

    // Recovery: initialization was started on the caller's behalf
    assert_eq!(h.orchestrator.state(), StoreState::Initializing);
    assert_eq!(h.gateway.initialize_calls(), 1);
    assert_eq!(h.gateway.purchase_calls(), 0);
}

#[test]
fn test_purchase_while_initializing_does_not_restart_initialization() {
    let mut h = Harness::new();
    h.orchestrator.initialize().unwrap();

    assert!(matches!(
        h.orchestrator.purchase("gem_100"),
        Err(IapError::NotInitialized)
    ));
    assert_eq!(h.gateway.initialize_calls(), 1);
}

#[test]
fn test_purchase_succeeds_after_recovery() {
    let mut h = Harness::new();
    assert!(h.orchestrator.purchase("gem_100").is_err());

    let metadata = available_metadata(h.orchestrator.catalog());
    h.orchestrator
        .dispatch(StoreEvent::Initialized { products: metadata });

    assert!(h.orchestrator.purchase("gem_100").is_ok());
    assert_eq!(h.gateway.purchase_calls(), 1);
}
