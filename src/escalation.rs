//! Failure escalation.
//!
//! Turns the pass/fail outcome of a check into a status transition, backed by
//! a persistent per-target failure counter:
//!
//! ```text
//! HEALTHY    --fail--> FAILING(1)
//! FAILING(n) --fail--> FAILING(n+1), emits Fail iff n+1 > threshold
//! FAILING(n) --pass--> HEALTHY, emits Ok
//! HEALTHY    --pass--> HEALTHY, emits None
//! ```
//!
//! Every failure past the threshold emits `Fail` again; the counter is only
//! reset by a passing check.

use crate::db::{CounterStore, DbError};

use serde::Serialize;
use tracing::{debug, info, warn};

/// Status carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Fail,
}

/// Decision produced by one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Nothing to notify about.
    None,
    /// Recovered after a failing streak.
    Ok,
    /// Consecutive failures exceed the threshold.
    Fail,
}

impl StatusTransition {
    /// The status to publish, if any.
    pub fn status(self) -> Option<Status> {
        match self {
            StatusTransition::None => None,
            StatusTransition::Ok => Some(Status::Ok),
            StatusTransition::Fail => Some(Status::Fail),
        }
    }
}

/// Record a check outcome for `target_id` and decide whether to notify.
pub fn evaluate(
    counters: &dyn CounterStore,
    target_id: &str,
    passed: bool,
    threshold: u32,
) -> Result<StatusTransition, DbError> {
    if passed {
        if counters.delete_if_exists(target_id)? {
            info!(target_id, "target recovered");
            return Ok(StatusTransition::Ok);
        }
        return Ok(StatusTransition::None);
    }

    let state = counters.increment_and_set_threshold(target_id, threshold)?;
    if state.threshold_crossed() {
        warn!(
            target_id,
            fail_counter = state.fail_counter,
            threshold = state.threshold,
            "failure threshold crossed"
        );
        Ok(StatusTransition::Fail)
    } else {
        debug!(
            target_id,
            fail_counter = state.fail_counter,
            threshold = state.threshold,
            "failure within threshold"
        );
        Ok(StatusTransition::None)
    }
}
