//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::jobs::{JobRecord, JobStatus, StageStatus};

/// What happened to the job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    StageStarted,
    StageProgress,
    StageCompleted,
    StageFailed,
    /// The reconciler moved the job to a new status.
    StatusChanged,
    Cancelled,
    /// The sweep flagged the job as stuck.
    Stale,
}

impl std::fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressEventKind::StageStarted => write!(f, "Stage started"),
            ProgressEventKind::StageProgress => write!(f, "Stage progress"),
            ProgressEventKind::StageCompleted => write!(f, "Stage completed"),
            ProgressEventKind::StageFailed => write!(f, "Stage failed"),
            ProgressEventKind::StatusChanged => write!(f, "Status changed"),
            ProgressEventKind::Cancelled => write!(f, "Cancelled"),
            ProgressEventKind::Stale => write!(f, "Stale"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub kind: ProgressEventKind,
    pub job_status: JobStatus,
    /// Stage the event concerns; absent for job-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_status: Option<StageStatus>,
    /// Counters of the stage, or of the whole job for job-level events.
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    /// Creates a job-level event.
    pub fn for_job(job: &JobRecord, kind: ProgressEventKind) -> Self {
        let (completed, failed, total) = if job.is_multi_stage {
            job.stages.iter().fold((0u64, 0u64, 0u64), |(c, f, t), s| {
                (
                    c.saturating_add(s.completed),
                    f.saturating_add(s.failed),
                    t.saturating_add(s.total),
                )
            })
        } else {
            (job.completed_items, job.failed_items, job.total_items)
        };

        Self {
            job_id: job.id.clone(),
            kind,
            job_status: job.status,
            stage: None,
            stage_status: None,
            completed,
            failed,
            total,
            message: job.message.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a stage event. Falls back to a job-level event if the stage
    /// is unknown.
    pub fn for_stage(job: &JobRecord, stage: &str, kind: ProgressEventKind) -> Self {
        let Some(state) = job.stage(stage) else {
            return Self::for_job(job, kind);
        };

        Self {
            job_id: job.id.clone(),
            kind,
            job_status: job.status,
            stage: Some(state.name.clone()),
            stage_status: Some(state.status),
            completed: state.completed,
            failed: state.failed,
            total: state.total,
            message: state.message.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for JobProgressBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProgressBroadcaster")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{STAGE_CACHE, STAGE_THUMBNAIL};

    fn job() -> JobRecord {
        let mut job = JobRecord::multi_stage("resume-collection", &[STAGE_THUMBNAIL, STAGE_CACHE])
            .unwrap();
        let thumbs = job.stage_mut(STAGE_THUMBNAIL).unwrap();
        thumbs.total = 4;
        thumbs.completed = 1;
        thumbs.failed = 1;
        let cache = job.stage_mut(STAGE_CACHE).unwrap();
        cache.total = 2;
        job
    }

    #[test]
    fn test_stage_event_carries_stage_counters() {
        let event = JobProgressEvent::for_stage(&job(), STAGE_THUMBNAIL, ProgressEventKind::StageProgress);
        assert_eq!(event.stage.as_deref(), Some(STAGE_THUMBNAIL));
        assert_eq!(event.completed, 1);
        assert_eq!(event.failed, 1);
        assert_eq!(event.total, 4);
    }

    #[test]
    fn test_job_event_sums_stages() {
        let event = JobProgressEvent::for_job(&job(), ProgressEventKind::StatusChanged);
        assert!(event.stage.is_none());
        assert_eq!(event.total, 6);
        assert_eq!(event.completed, 1);
    }

    #[test]
    fn test_unknown_stage_falls_back_to_job_event() {
        let event = JobProgressEvent::for_stage(&job(), "scan", ProgressEventKind::StageStarted);
        assert!(event.stage.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobProgressEvent::for_job(&job(), ProgressEventKind::Cancelled));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ProgressEventKind::Cancelled);
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobProgressBroadcaster::default();
        assert_eq!(broadcaster.receiver_count(), 0);
        broadcaster.send(JobProgressEvent::for_job(&job(), ProgressEventKind::Stale));
    }
}
