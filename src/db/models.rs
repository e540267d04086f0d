//! Database model types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single raw probe result, recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResultRecord {
    /// Uniquely identifies one check run.
    pub run_id: String,
    pub target_id: String,
    /// When the check was invoked.
    pub run_at: DateTime<Utc>,
    pub host: String,
    pub status_code: u16,
    pub ttfb_ms: i64,
    pub dns_lookup_ms: i64,
    pub tls_handshake_ms: i64,
}

/// Failure streak bookkeeping for one target.
///
/// A row exists only while the target is failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCounterState {
    pub fail_counter: u32,
    pub threshold: u32,
}

impl FailureCounterState {
    pub fn threshold_crossed(&self) -> bool {
        self.fail_counter > self.threshold
    }
}
