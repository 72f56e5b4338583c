//! revtrader: a single-instrument mean-reversion trading bot.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`live`] drives the domain from
//! a streaming bar feed; [`cli`] wires everything to the command line.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod live;
pub mod ports;
