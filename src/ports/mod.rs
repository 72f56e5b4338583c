//! Port traits the domain is driven through.

pub mod bar_source;
pub mod config_port;
pub mod execution_port;
