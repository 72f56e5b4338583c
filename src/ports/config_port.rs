//! Configuration access port.
//!
//! Lookups are by `[section] key`. Parsing into typed values happens in
//! `domain::config_validation` so every bad value surfaces with its key.

pub trait ConfigPort {
    /// The raw value, or `None` when the key is absent or blank.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}
