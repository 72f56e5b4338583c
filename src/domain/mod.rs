//! Core domain types and logic.

pub mod bar;
pub mod percent_change;
pub mod indicator;
pub mod strategy;
pub mod order;
pub mod position;
pub mod state_machine;
pub mod ledger;
pub mod execution;
pub mod session;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
