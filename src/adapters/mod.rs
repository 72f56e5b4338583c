//! Concrete adapter implementations for ports.

#[cfg(feature = "alpaca")]
pub mod alpaca;
pub mod csv_adapter;
pub mod file_config_adapter;
