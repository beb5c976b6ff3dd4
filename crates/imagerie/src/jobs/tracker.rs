//! Job lifecycle operations on top of the repository.
//!
//! Counter increments go straight to the repository's atomic update.
//! Every other write loads the job, applies a change, reconciles, and
//! writes it back under the optimistic version check, retrying on
//! conflict.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::counter::StageCounter;
use super::health::{assess, HealthThresholds, JobHealth};
use super::reconcile::{reconcile, ReconcileOutcome};
use super::record::JobRecord;
use super::status::{JobStatus, StageStatus};
use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, ProgressEventKind};
use crate::db::JobRepository;
use crate::error::JobError;

const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Totals from one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    /// Jobs whose status (or a stage's status) advanced.
    pub transitioned: usize,
    /// Jobs flagged stuck for the first time.
    pub newly_stale: usize,
    /// Jobs that could not be reconciled this round.
    pub failures: usize,
}

/// Result of a change applied inside [`JobTracker::mutate`].
enum Change {
    Write,
    /// Write and append the entry to the job's error list atomically.
    WriteWithError(String),
    Unchanged,
}

#[derive(Clone)]
pub struct JobTracker {
    repo: Arc<dyn JobRepository>,
    counter: StageCounter,
    broadcaster: Option<JobProgressBroadcaster>,
    thresholds: HealthThresholds,
}

impl JobTracker {
    pub fn new(repo: Arc<dyn JobRepository>, thresholds: HealthThresholds) -> Self {
        Self {
            counter: StageCounter::new(Arc::clone(&repo)),
            repo,
            broadcaster: None,
            thresholds,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn counter(&self) -> &StageCounter {
        &self.counter
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    // ─── Creation and reads ─────────────────────────────────────────────

    pub fn create_job(&self, job: &JobRecord) -> Result<(), JobError> {
        self.repo.create_job(job)?;
        info!(
            "Created {} job {} with {} stage(s)",
            job.job_type,
            job.id,
            job.stages.len()
        );
        Ok(())
    }

    /// Loads a job with its status reconciled against the current counters.
    /// A status change found on read is persisted.
    pub fn get_job(&self, id: &str) -> Result<Option<JobRecord>, JobError> {
        let Some(mut job) = self.repo.get_job(id)? else {
            return Ok(None);
        };
        let outcome = reconcile(&mut job, Utc::now());
        if outcome.changed() {
            self.persist_reconciled(&mut job, &outcome)?;
        }
        Ok(Some(job))
    }

    pub fn require_job(&self, id: &str) -> Result<JobRecord, JobError> {
        self.get_job(id)?.ok_or_else(|| JobError::NotFound {
            job_id: id.to_string(),
        })
    }

    pub fn job_health(&self, id: &str, now: DateTime<Utc>) -> Result<JobHealth, JobError> {
        let job = self.require_job(id)?;
        Ok(assess(&job, now, &self.thresholds))
    }

    // ─── Counters ───────────────────────────────────────────────────────

    /// See [`StageCounter::increment`]. Never fails; `false` means the
    /// increment was not applied.
    pub fn increment_stage(&self, job_id: &str, stage: &str, by: u64) -> bool {
        self.counter.increment(job_id, stage, by)
    }

    pub fn record_stage_failure(&self, job_id: &str, stage: &str, by: u64, error: &str) -> bool {
        self.counter.record_failure(job_id, stage, by, error)
    }

    pub fn increment_items(&self, job_id: &str, completed: u64, failed: u64) -> bool {
        self.counter.increment_items(job_id, completed, failed)
    }

    /// Increments a stage, optionally replaces its message, and reconciles.
    /// Returns whether the increment was applied.
    pub fn update_stage_progress(
        &self,
        job_id: &str,
        stage: &str,
        increment: u64,
        message: Option<&str>,
    ) -> Result<bool, JobError> {
        let applied = increment > 0 && self.counter.increment(job_id, stage, increment);

        let job = self.mutate(job_id, |job| {
            if job.is_terminal() {
                return Ok(Change::Unchanged);
            }
            let state = stage_mut(job, stage)?;
            match message {
                Some(m) if state.message.as_deref() != Some(m) => {
                    state.message = Some(m.to_string());
                    Ok(Change::Write)
                }
                _ => Ok(Change::Unchanged),
            }
        })?;

        if applied {
            self.emit(JobProgressEvent::for_stage(
                &job,
                stage,
                ProgressEventKind::StageProgress,
            ));
        }
        Ok(applied)
    }

    // ─── Explicit transitions ───────────────────────────────────────────

    /// Starts a single-stage job with its overall total. A job with nothing
    /// to do completes on the spot.
    pub fn start_job(
        &self,
        job_id: &str,
        total: u64,
        message: Option<&str>,
    ) -> Result<JobRecord, JobError> {
        check_total(total)?;
        self.mutate(job_id, |job| {
            ensure_active(job)?;
            if job.is_multi_stage {
                return Err(JobError::Validation(format!(
                    "job {} is multi-stage; start its stages instead",
                    job.id
                )));
            }
            let now = Utc::now();
            job.total_items = total;
            job.status = job.status.advance(if total == 0 {
                JobStatus::Completed
            } else {
                JobStatus::InProgress
            });
            job.started_at.get_or_insert(now);
            if let Some(m) = message {
                job.message = Some(m.to_string());
            }
            Ok(Change::Write)
        })
    }

    /// Seeds a stage's total and marks it in progress.
    ///
    /// Repeating the call with the same total is a no-op; a different total
    /// is rejected. A zero total seals the stage as Completed, since no
    /// counter could ever finish it.
    pub fn start_stage(
        &self,
        job_id: &str,
        stage: &str,
        total: u64,
        message: Option<&str>,
    ) -> Result<JobRecord, JobError> {
        check_total(total)?;
        let job = self.mutate(job_id, |job| {
            ensure_active(job)?;
            let now = Utc::now();
            let state = stage_mut(job, stage)?;

            if state.sealed {
                if state.total == total {
                    return Ok(Change::Unchanged);
                }
                return Err(JobError::StageAlreadySealed {
                    stage: stage.to_string(),
                    sealed: state.total,
                    requested: total,
                });
            }
            if state.status.is_terminal() {
                return Err(JobError::Validation(format!(
                    "stage '{}' is already {}",
                    stage, state.status
                )));
            }

            state.total = total;
            state.sealed = true;
            state.started_at.get_or_insert(now);
            if total == 0 {
                state.status = StageStatus::Completed;
                state.completed_at = Some(now);
            } else {
                state.status = StageStatus::InProgress;
            }
            if let Some(m) = message {
                state.message = Some(m.to_string());
            }

            job.status = job.status.advance(JobStatus::InProgress);
            job.started_at.get_or_insert(now);
            Ok(Change::Write)
        })?;

        debug!("Started stage {}/{} with total {}", job_id, stage, total);
        self.emit(JobProgressEvent::for_stage(
            &job,
            stage,
            ProgressEventKind::StageStarted,
        ));
        if total == 0 {
            self.emit(JobProgressEvent::for_stage(
                &job,
                stage,
                ProgressEventKind::StageCompleted,
            ));
        }
        Ok(job)
    }

    /// Forces a stage to Completed regardless of its counters.
    pub fn complete_stage(
        &self,
        job_id: &str,
        stage: &str,
        message: Option<&str>,
    ) -> Result<JobRecord, JobError> {
        let job = self.mutate(job_id, |job| {
            ensure_active(job)?;
            let now = Utc::now();
            let state = stage_mut(job, stage)?;
            match state.status {
                StageStatus::Completed => return Ok(Change::Unchanged),
                StageStatus::Failed => {
                    return Err(JobError::Validation(format!(
                        "stage '{}' already failed",
                        stage
                    )))
                }
                StageStatus::Pending | StageStatus::InProgress => {}
            }

            state.status = StageStatus::Completed;
            state.sealed = true;
            state.started_at.get_or_insert(now);
            state.completed_at = Some(now);
            if let Some(m) = message {
                state.message = Some(m.to_string());
            }
            job.status = job.status.advance(JobStatus::InProgress);
            job.started_at.get_or_insert(now);
            Ok(Change::Write)
        })?;

        info!("Completed stage {}/{}", job_id, stage);
        self.emit(JobProgressEvent::for_stage(
            &job,
            stage,
            ProgressEventKind::StageCompleted,
        ));
        Ok(job)
    }

    /// Marks a stage Failed and records `message` in the job's error list.
    /// The job becomes Failed on the same write.
    pub fn fail_stage(
        &self,
        job_id: &str,
        stage: &str,
        message: &str,
    ) -> Result<JobRecord, JobError> {
        let job = self.mutate(job_id, |job| {
            ensure_active(job)?;
            let now = Utc::now();
            let state = stage_mut(job, stage)?;
            if state.status == StageStatus::Completed {
                return Err(JobError::Validation(format!(
                    "stage '{}' already completed",
                    stage
                )));
            }
            state.status = StageStatus::Failed;
            state.completed_at = Some(now);
            state.message = Some(message.to_string());
            Ok(Change::WriteWithError(format!(
                "stage '{}' failed: {}",
                stage, message
            )))
        })?;

        warn!("Stage {}/{} failed: {}", job_id, stage, message);
        self.emit(JobProgressEvent::for_stage(
            &job,
            stage,
            ProgressEventKind::StageFailed,
        ));
        Ok(job)
    }

    /// Moves a job to Cancelled. Cancelling a cancelled job is a no-op;
    /// cancelling a completed or failed job is an error.
    pub fn cancel_job(&self, job_id: &str, reason: &str) -> Result<JobRecord, JobError> {
        let job = self.mutate(job_id, |job| {
            if job.status == JobStatus::Cancelled {
                return Ok(Change::Unchanged);
            }
            ensure_active(job)?;
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            job.message = Some(reason.to_string());
            Ok(Change::Write)
        })?;

        info!("Cancelled job {}: {}", job_id, reason);
        self.emit(JobProgressEvent::for_job(&job, ProgressEventKind::Cancelled));
        Ok(job)
    }

    // ─── Reconciliation ─────────────────────────────────────────────────

    /// Reconciles one job and persists any change, including a refreshed
    /// completion estimate.
    pub fn reconcile(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, JobError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut job = self.load(job_id)?;
            let estimate = job.estimated_completion;
            let outcome = reconcile(&mut job, now);
            if !outcome.changed() && job.estimated_completion == estimate {
                return Ok(outcome);
            }

            job.updated_at = now;
            if self.repo.update_job(&job)? {
                job.version += 1;
                self.emit_transitions(&job, &outcome);
                return Ok(outcome);
            }
            debug!("Version conflict reconciling {}, retrying", job_id);
        }
        Err(JobError::VersionConflict {
            job_id: job_id.to_string(),
        })
    }

    /// Reconciles every non-terminal job and flags newly stuck ones.
    ///
    /// Per-job failures are counted and logged; the sweep always visits
    /// every job.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, JobError> {
        let span = tracing::info_span!("reconcile_sweep");
        let _enter = span.enter();

        let ids = self.repo.list_active_ids()?;
        let mut report = SweepReport {
            examined: ids.len(),
            ..SweepReport::default()
        };

        for id in &ids {
            match self.sweep_one(id, now) {
                Ok((transitioned, newly_stale)) => {
                    report.transitioned += usize::from(transitioned);
                    report.newly_stale += usize::from(newly_stale);
                }
                Err(e) => {
                    warn!("Sweep could not reconcile job {}: {}", id, e);
                    report.failures += 1;
                }
            }
        }

        if report.transitioned > 0 || report.newly_stale > 0 || report.failures > 0 {
            info!(
                "Sweep examined {} job(s): {} transitioned, {} newly stale, {} failed",
                report.examined, report.transitioned, report.newly_stale, report.failures
            );
        } else {
            debug!("Sweep examined {} job(s), nothing to do", report.examined);
        }
        Ok(report)
    }

    fn sweep_one(&self, id: &str, now: DateTime<Utc>) -> Result<(bool, bool), JobError> {
        let outcome = self.reconcile(id, now)?;
        let job = self.load(id)?;
        let health = assess(&job, now, &self.thresholds);

        let mut newly_stale = false;
        if health.is_stuck && job.stale_flagged_at.is_none() && self.repo.mark_stale(id, now)? {
            newly_stale = true;
            warn!(
                "Job {} looks stuck ({}): {}",
                id,
                job.status,
                health.issues.join("; ")
            );
            self.emit(JobProgressEvent::for_job(&job, ProgressEventKind::Stale));
        }
        Ok((outcome.changed(), newly_stale))
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn load(&self, id: &str) -> Result<JobRecord, JobError> {
        self.repo.get_job(id)?.ok_or_else(|| JobError::NotFound {
            job_id: id.to_string(),
        })
    }

    /// Load, change, reconcile and write back under the version check.
    fn mutate<F>(&self, job_id: &str, mut change: F) -> Result<JobRecord, JobError>
    where
        F: FnMut(&mut JobRecord) -> Result<Change, JobError>,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut job = self.load(job_id)?;
            let now = Utc::now();

            let change = change(&mut job)?;
            let outcome = reconcile(&mut job, now);
            if matches!(change, Change::Unchanged) && !outcome.changed() {
                return Ok(job);
            }

            job.updated_at = now;
            let written = match &change {
                Change::WriteWithError(error) => self.repo.update_job_with_error(&job, error)?,
                Change::Write | Change::Unchanged => self.repo.update_job(&job)?,
            };
            if written {
                job.version += 1;
                if let Change::WriteWithError(error) = change {
                    job.errors.push(error);
                }
                self.emit_transitions(&job, &outcome);
                return Ok(job);
            }
            debug!("Version conflict updating {}, retrying", job_id);
        }
        Err(JobError::VersionConflict {
            job_id: job_id.to_string(),
        })
    }

    /// Best-effort write of a status found on read. Losing the race is fine:
    /// whoever won wrote a status at least as advanced.
    fn persist_reconciled(
        &self,
        job: &mut JobRecord,
        outcome: &ReconcileOutcome,
    ) -> Result<(), JobError> {
        job.updated_at = Utc::now();
        if self.repo.update_job(job)? {
            job.version += 1;
            self.emit_transitions(job, outcome);
        } else {
            debug!("Lazy reconcile of {} lost a race", job.id);
        }
        Ok(())
    }

    fn emit_transitions(&self, job: &JobRecord, outcome: &ReconcileOutcome) {
        for transition in &outcome.stage_transitions {
            if transition.to == StageStatus::Completed {
                info!("Stage {}/{} completed", job.id, transition.stage);
                self.emit(JobProgressEvent::for_stage(
                    job,
                    &transition.stage,
                    ProgressEventKind::StageCompleted,
                ));
            }
        }
        if outcome.job_changed() {
            info!(
                "Job {} moved from {} to {}",
                job.id, outcome.previous, outcome.status
            );
            self.emit(JobProgressEvent::for_job(job, ProgressEventKind::StatusChanged));
        }
    }

    fn emit(&self, event: JobProgressEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(event);
        }
    }
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

/// Totals are stored as signed 64-bit integers.
fn check_total(total: u64) -> Result<(), JobError> {
    if i64::try_from(total).is_err() {
        return Err(JobError::Validation(format!(
            "total {} exceeds the supported maximum {}",
            total,
            i64::MAX
        )));
    }
    Ok(())
}

fn ensure_active(job: &JobRecord) -> Result<(), JobError> {
    if job.is_terminal() {
        return Err(JobError::Terminal {
            job_id: job.id.clone(),
            status: job.status.to_string(),
        });
    }
    Ok(())
}

fn stage_mut<'a>(
    job: &'a mut JobRecord,
    stage: &str,
) -> Result<&'a mut super::record::StageState, JobError> {
    let job_id = job.id.clone();
    job.stage_mut(stage).ok_or_else(|| JobError::StageNotFound {
        job_id,
        stage: stage.to_string(),
    })
}
