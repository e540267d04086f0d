//! Check orchestration.
//!
//! Runs one check cycle: probe, persist the raw result, update escalation
//! state, and notify on status transitions.

use crate::db::{CounterStore, DbError, RawResultRecord, ResultStore};
use crate::escalation;
use crate::notify::{Notification, PublishError, Publisher};
use crate::probe::{normalize_host, ProbeError, ProbeResult, Prober};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Check error types. Each one aborts the run.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Transport(#[from] ProbeError),
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),
}

/// Run a synchronous storage call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, CheckError>
where
    F: FnOnce() -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// What to probe and which status codes count as healthy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTarget {
    pub target_id: String,
    pub host: String,
    pub expected_status_codes: Vec<u16>,
}

/// Externally visible outcome of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub host: String,
    pub status_code: u16,
    pub ttfb_ms: u64,
    pub dns_lookup_ms: u64,
    pub tls_handshake_ms: u64,
}

impl CheckReport {
    fn new(host: String, probe: ProbeResult) -> Self {
        Self {
            host,
            status_code: probe.status_code,
            ttfb_ms: probe.ttfb_ms,
            dns_lookup_ms: probe.dns_lookup_ms,
            tls_handshake_ms: probe.tls_handshake_ms,
        }
    }
}

/// Runs checks against injected storage and publish collaborators.
pub struct Checker {
    prober: Prober,
    timeout: Duration,
    threshold: u32,
    counters: Arc<dyn CounterStore>,
    results: Option<Arc<dyn ResultStore>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl Checker {
    pub fn new(prober: Prober, counters: Arc<dyn CounterStore>, timeout: Duration, threshold: u32) -> Self {
        Self {
            prober,
            timeout,
            threshold,
            counters,
            results: None,
            publisher: None,
        }
    }

    /// Persist raw results of every completed probe.
    pub fn with_results(mut self, results: Arc<dyn ResultStore>) -> Self {
        self.results = Some(results);
        self
    }

    /// Publish status transitions.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run one check cycle for `target`.
    pub async fn run_check(&self, target: &CheckTarget) -> Result<CheckReport, CheckError> {
        let run_at = Utc::now();
        let host = normalize_host(&target.host);

        let probe = match self.prober.probe(&host, self.timeout).await {
            Ok(probe) => probe,
            Err(e) => {
                tracing::warn!(target_id = %target.target_id, %host, error = %e, "probe failed");
                return Err(e.into());
            }
        };

        if let Some(results) = &self.results {
            let record = RawResultRecord {
                run_id: Uuid::new_v4().to_string(),
                target_id: target.target_id.clone(),
                run_at,
                host: host.clone(),
                status_code: probe.status_code,
                ttfb_ms: probe.ttfb_ms as i64,
                dns_lookup_ms: probe.dns_lookup_ms as i64,
                tls_handshake_ms: probe.tls_handshake_ms as i64,
            };
            let results = results.clone();
            if let Err(e) = blocking(move || results.put(&record)).await {
                tracing::error!(target_id = %target.target_id, error = %e, "failed to store raw result");
                return Err(e);
            }
        }

        let passed = target.expected_status_codes.contains(&probe.status_code);
        let counters = self.counters.clone();
        let target_id = target.target_id.clone();
        let threshold = self.threshold;
        let transition = blocking(move || {
            escalation::evaluate(counters.as_ref(), &target_id, passed, threshold)
        })
        .await
        .map_err(|e| {
            tracing::error!(target_id = %target.target_id, error = %e, "failed to update failure counter");
            e
        })?;

        if let (Some(status), Some(publisher)) = (transition.status(), &self.publisher) {
            if let Err(e) = publisher.publish(&Notification { status }, &target.target_id).await {
                tracing::error!(target_id = %target.target_id, ?status, error = %e, "failed to publish notification");
                return Err(e.into());
            }
        }

        tracing::debug!(
            target_id = %target.target_id,
            status_code = probe.status_code,
            passed,
            transition = ?transition,
            "check completed"
        );

        Ok(CheckReport::new(host, probe))
    }
}
