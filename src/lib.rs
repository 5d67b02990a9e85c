//! Multi-chain governance proposal monitor.
//!
//! Library half of the `govwatch` binary; integration tests drive the
//! pipeline through these modules directly.

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod normalize;
pub mod notify;
pub mod probe;
pub mod retrieve;
pub mod scheduler;
