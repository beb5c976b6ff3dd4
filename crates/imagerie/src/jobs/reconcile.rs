//! Status derivation from counters.
//!
//! Everything here is a pure function of a [`JobRecord`] and a clock value,
//! so it may run any number of times, from any trigger, in any process,
//! and converge on the same answer.

use chrono::{DateTime, Utc};

use super::record::{JobRecord, StageState};
use super::status::{JobStatus, StageStatus};

/// A stage whose status changed during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTransition {
    pub stage: String,
    pub from: StageStatus,
    pub to: StageStatus,
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub previous: JobStatus,
    pub status: JobStatus,
    pub stage_transitions: Vec<StageTransition>,
}

impl ReconcileOutcome {
    pub fn job_changed(&self) -> bool {
        self.previous != self.status
    }

    pub fn changed(&self) -> bool {
        self.job_changed() || !self.stage_transitions.is_empty()
    }
}

/// Status a stage's counters call for, ignoring its current status.
pub fn derive_stage_status(stage: &StageState) -> StageStatus {
    if stage.total > 0 && stage.processed() >= stage.total {
        StageStatus::Completed
    } else if stage.completed > 0 {
        StageStatus::InProgress
    } else {
        StageStatus::Pending
    }
}

/// Status the job's stages (or overall counters) call for.
pub fn derive_job_status(job: &JobRecord) -> JobStatus {
    if job.is_multi_stage {
        derive_from_stages(&job.stages)
    } else {
        let processed = job.completed_items.saturating_add(job.failed_items);
        if job.total_items > 0 && processed >= job.total_items {
            JobStatus::Completed
        } else if job.completed_items > 0 {
            JobStatus::InProgress
        } else {
            JobStatus::Pending
        }
    }
}

fn derive_from_stages(stages: &[StageState]) -> JobStatus {
    if stages.is_empty() {
        return JobStatus::Pending;
    }

    if stages.iter().all(|s| s.status == StageStatus::Completed) {
        return JobStatus::Completed;
    }

    // A failed stage makes every later stage ineligible, so the job cannot finish.
    if stages.iter().any(|s| s.status == StageStatus::Failed) {
        return JobStatus::Failed;
    }

    if stages
        .iter()
        .any(|s| matches!(s.status, StageStatus::InProgress | StageStatus::Completed))
    {
        JobStatus::InProgress
    } else {
        JobStatus::Pending
    }
}

/// Advances stage and job statuses in place from the current counters.
pub fn reconcile(job: &mut JobRecord, now: DateTime<Utc>) -> ReconcileOutcome {
    let previous = job.status;
    let mut stage_transitions = Vec::new();

    for stage in &mut job.stages {
        let next = stage.status.advance(derive_stage_status(stage));
        if next != stage.status {
            stage_transitions.push(StageTransition {
                stage: stage.name.clone(),
                from: stage.status,
                to: next,
            });
            if next == StageStatus::InProgress && stage.started_at.is_none() {
                stage.started_at = Some(now);
            }
            if next.is_terminal() && stage.completed_at.is_none() {
                stage.completed_at = Some(now);
            }
            stage.status = next;
        }
    }

    job.status = job.status.advance(derive_job_status(job));

    if job.status != previous {
        if job.status == JobStatus::InProgress && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if job.status.is_terminal() && job.completed_at.is_none() {
            job.completed_at = Some(now);
        }
    }

    job.estimated_completion = estimate_completion(job, now);

    ReconcileOutcome {
        previous,
        status: job.status,
        stage_transitions,
    }
}

/// Linear extrapolation from the elapsed time and completed fraction.
fn estimate_completion(job: &JobRecord, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if job.is_terminal() {
        return job.completed_at;
    }

    let started = job.started_at?;
    let fraction = job.progress_fraction()?;
    if fraction <= 0.0 {
        return None;
    }

    let elapsed_ms = (now - started).num_milliseconds().max(0) as f64;
    let projected_total_ms = elapsed_ms / fraction;
    // Slow progress on a huge total projects past what a timestamp can hold.
    let projected = chrono::Duration::try_milliseconds(projected_total_ms as i64)?;
    started.checked_add_signed(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::{STAGE_CACHE, STAGE_SCAN, STAGE_THUMBNAIL};

    fn three_stage() -> JobRecord {
        JobRecord::multi_stage("collection-scan", &[STAGE_SCAN, STAGE_THUMBNAIL, STAGE_CACHE])
            .unwrap()
    }

    fn seed(job: &mut JobRecord, stage: &str, total: u64) {
        let s = job.stage_mut(stage).unwrap();
        s.total = total;
        s.sealed = true;
    }

    #[test]
    fn test_stage_pending_until_first_completion() {
        let mut stage = StageState::new("thumbnail");
        stage.total = 10;
        assert_eq!(derive_stage_status(&stage), StageStatus::Pending);

        stage.failed = 3;
        assert_eq!(derive_stage_status(&stage), StageStatus::Pending);

        stage.completed = 1;
        assert_eq!(derive_stage_status(&stage), StageStatus::InProgress);
    }

    #[test]
    fn test_stage_completes_when_processed_reaches_total() {
        let mut stage = StageState::new("cache");
        stage.total = 5;
        stage.completed = 3;
        stage.failed = 2;
        assert_eq!(derive_stage_status(&stage), StageStatus::Completed);
    }

    #[test]
    fn test_unseeded_stage_never_completes_from_counters() {
        let mut stage = StageState::new("scan");
        stage.completed = 50;
        assert_eq!(derive_stage_status(&stage), StageStatus::InProgress);
    }

    #[test]
    fn test_job_completed_only_when_every_stage_completed() {
        let mut job = three_stage();
        let now = Utc::now();
        for name in [STAGE_SCAN, STAGE_THUMBNAIL] {
            seed(&mut job, name, 2);
            job.stage_mut(name).unwrap().completed = 2;
        }
        let outcome = reconcile(&mut job, now);
        assert_eq!(outcome.status, JobStatus::InProgress);
        assert_eq!(outcome.stage_transitions.len(), 2);

        seed(&mut job, STAGE_CACHE, 1);
        job.stage_mut(STAGE_CACHE).unwrap().completed = 1;
        let outcome = reconcile(&mut job, now);
        assert_eq!(outcome.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_failed_stage_fails_job_but_keeps_completed_stages() {
        let mut job = three_stage();
        seed(&mut job, STAGE_SCAN, 1);
        job.stage_mut(STAGE_SCAN).unwrap().completed = 1;
        job.stage_mut(STAGE_THUMBNAIL).unwrap().status = StageStatus::Failed;

        reconcile(&mut job, Utc::now());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.stage(STAGE_SCAN).unwrap().status, StageStatus::Completed);
    }

    #[test]
    fn test_terminal_job_is_not_reopened_by_counters() {
        let mut job = three_stage();
        job.status = JobStatus::Completed;
        job.stage_mut(STAGE_SCAN).unwrap().completed = 4;

        let outcome = reconcile(&mut job, Utc::now());
        assert_eq!(outcome.status, JobStatus::Completed);
        assert!(!outcome.job_changed());
    }

    #[test]
    fn test_cancelled_job_stays_cancelled() {
        let mut job = JobRecord::single("import").unwrap();
        job.status = JobStatus::Cancelled;
        job.total_items = 2;
        job.completed_items = 2;

        reconcile(&mut job, Utc::now());
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_single_stage_job_uses_overall_counters() {
        let mut job = JobRecord::single("import").unwrap();
        job.total_items = 3;
        job.completed_items = 1;
        reconcile(&mut job, Utc::now());
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.started_at.is_some());

        job.completed_items = 2;
        job.failed_items = 1;
        reconcile(&mut job, Utc::now());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut job = three_stage();
        seed(&mut job, STAGE_SCAN, 4);
        job.stage_mut(STAGE_SCAN).unwrap().completed = 2;
        let now = Utc::now();

        let first = reconcile(&mut job, now);
        assert!(first.changed());
        let snapshot = job.clone();

        let second = reconcile(&mut job, now);
        assert!(!second.changed());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_estimated_completion_extrapolates() {
        let mut job = JobRecord::single("import").unwrap();
        let started = Utc::now() - chrono::Duration::seconds(100);
        job.started_at = Some(started);
        job.status = JobStatus::InProgress;
        job.total_items = 4;
        job.completed_items = 1;

        let now = started + chrono::Duration::seconds(100);
        reconcile(&mut job, now);

        let eta = job.estimated_completion.unwrap();
        assert_eq!((eta - started).num_seconds(), 400);
    }

    #[test]
    fn test_estimate_beyond_representable_time_is_dropped() {
        let mut job = three_stage();
        seed(&mut job, STAGE_THUMBNAIL, 1_000_000_000_000);
        job.stage_mut(STAGE_THUMBNAIL).unwrap().completed = 1;
        let started = Utc::now();
        job.started_at = Some(started);
        job.status = JobStatus::InProgress;

        let outcome = reconcile(&mut job, started + chrono::Duration::hours(1));
        assert_eq!(outcome.status, JobStatus::InProgress);
        assert!(job.estimated_completion.is_none());
    }

    #[test]
    fn test_estimate_with_slow_progress_stays_in_range() {
        let mut job = JobRecord::single("import").unwrap();
        let started = Utc::now() - chrono::Duration::days(1);
        job.started_at = Some(started);
        job.status = JobStatus::InProgress;
        job.total_items = 1_024;
        job.completed_items = 1;

        reconcile(&mut job, started + chrono::Duration::days(1));
        let eta = job.estimated_completion.unwrap();
        assert_eq!((eta - started).num_days(), 1_024);

        // Counters at the top of the stored range still reconcile.
        job.total_items = i64::MAX as u64;
        reconcile(&mut job, started + chrono::Duration::days(365));
        assert!(job.estimated_completion.is_none());
    }
}
