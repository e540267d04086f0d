//! Database module for the uptime probe.
//!
//! Provides SQLite storage for raw results and failure counters.

mod models;
mod store;

pub use models::*;
pub use store::*;
