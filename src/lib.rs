//! Payflow - Multi-Provider Payment Orchestration Engine
//!
//! This crate normalizes behaviorally different payment vendors (card rails,
//! wallets, hosted redirects) behind one provider contract, and computes
//! billable amounts through a family of pricing strategies including
//! mid-period plan-change proration.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
