//! The worker-facing increment operation.
//!
//! Workers call this once per finished item. A rejected increment is
//! logged and reported as `false`; it is never an error the worker has to
//! handle, and the status is reconciled later by reads and the sweep.

use std::sync::Arc;

use log::{debug, warn};

use crate::db::{DatabaseError, IncrementOutcome, JobRepository};

#[derive(Clone)]
pub struct StageCounter {
    repo: Arc<dyn JobRepository>,
}

impl StageCounter {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self { repo }
    }

    /// Adds `by` to the stage's completed counter. Returns `true` only when
    /// the increment was applied.
    pub fn increment(&self, job_id: &str, stage: &str, by: u64) -> bool {
        if !accepts(job_id, Some(stage), by) {
            return false;
        }
        let outcome = self.repo.increment_stage(job_id, stage, by);
        report(job_id, Some(stage), by, outcome)
    }

    /// Adds to a single-stage job's overall counters.
    pub fn increment_items(&self, job_id: &str, completed: u64, failed: u64) -> bool {
        let Some(by) = completed.checked_add(failed) else {
            warn!(
                "Ignoring increment for {}: {} + {} overflows the counter",
                job_id, completed, failed
            );
            return false;
        };
        if !accepts(job_id, None, by) {
            return false;
        }
        let outcome = self.repo.increment_items(job_id, completed, failed);
        report(job_id, None, by, outcome)
    }

    /// Counts `by` failed items on a stage and records `error` against the job.
    pub fn record_failure(&self, job_id: &str, stage: &str, by: u64, error: &str) -> bool {
        if !accepts(job_id, Some(stage), by) {
            return false;
        }
        let outcome = self.repo.record_stage_failure(job_id, stage, by, error);
        report(job_id, Some(stage), by, outcome)
    }
}

impl std::fmt::Debug for StageCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageCounter").finish_non_exhaustive()
    }
}

/// Rejects amounts that are zero or too large for the stored counters.
fn accepts(job_id: &str, stage: Option<&str>, by: u64) -> bool {
    let target = stage.map_or_else(|| job_id.to_string(), |s| format!("{}/{}", job_id, s));
    if by == 0 {
        warn!("Ignoring zero increment for {}", target);
        return false;
    }
    if i64::try_from(by).is_err() {
        warn!("Ignoring increment of {} for {}: out of range", by, target);
        return false;
    }
    true
}

fn report(
    job_id: &str,
    stage: Option<&str>,
    by: u64,
    outcome: Result<IncrementOutcome, DatabaseError>,
) -> bool {
    let target = match stage {
        Some(stage) => format!("{}/{}", job_id, stage),
        None => job_id.to_string(),
    };

    match outcome {
        Ok(IncrementOutcome::Applied(value)) => {
            debug!("Incremented {} by {} (now {})", target, by, value);
            true
        }
        Ok(IncrementOutcome::JobNotFound) => {
            warn!("Increment skipped, job not found: {}", job_id);
            false
        }
        Ok(IncrementOutcome::StageNotFound) => {
            warn!("Increment skipped, stage not found: {}", target);
            false
        }
        Ok(IncrementOutcome::JobTerminal(status)) => {
            warn!("Increment dropped, job {} is already {}", job_id, status);
            false
        }
        Ok(IncrementOutcome::WouldExceedTotal { processed, total }) => {
            warn!(
                "Increment rejected for {}: {} processed would exceed total {}",
                target, processed, total
            );
            false
        }
        Ok(IncrementOutcome::OutOfRange(amount)) => {
            warn!("Increment rejected for {}: {} is out of range", target, amount);
            false
        }
        Err(e) => {
            warn!("Increment failed for {}: {}", target, e);
            false
        }
    }
}
