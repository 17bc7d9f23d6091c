//! iapkit - In-app purchase integration layer for game clients
//!
//! This library registers purchasable products with a platform store, drives the
//! store through initialization, purchase and restore flows, validates receipts
//! against the stores' public keys, and grants rewards exactly once per
//! validated transaction.

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod rewards;
pub mod signals;
pub mod validator;
