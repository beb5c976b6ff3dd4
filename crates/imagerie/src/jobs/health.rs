//! Read-side staleness assessment.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::JobRecord;
use super::status::{JobStatus, StageStatus};
use crate::config::JobsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub stuck_after: Duration,
    pub timeout_after: Duration,
}

impl HealthThresholds {
    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            stuck_after: config.stuck_after(),
            timeout_after: config.timeout_after(),
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHealth {
    pub job_id: String,
    pub status: JobStatus,
    pub is_stuck: bool,
    pub is_timed_out: bool,
    /// Time since the job started, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<i64>,
    pub issues: Vec<String>,
}

impl JobHealth {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Assesses a job at `now`. Terminal jobs are never stuck or timed out.
pub fn assess(job: &JobRecord, now: DateTime<Utc>, thresholds: &HealthThresholds) -> JobHealth {
    let elapsed = job.started_at.map(|started| now - started);
    let elapsed_secs = elapsed.map(|e| e.num_seconds().max(0));

    let mut is_stuck = false;
    let mut is_timed_out = false;
    let mut issues = Vec::new();

    if !job.is_terminal() {
        if let Some(secs) = elapsed_secs {
            let secs = secs as u64;
            if secs > thresholds.stuck_after.as_secs() {
                is_stuck = true;
                issues.push(format!("running for {}s without finishing", secs));
            }
            if secs > thresholds.timeout_after.as_secs() {
                is_timed_out = true;
                issues.push(format!(
                    "exceeded timeout of {}s",
                    thresholds.timeout_after.as_secs()
                ));
            }
        }

        for stage in &job.stages {
            if stage.status == StageStatus::InProgress && !stage.sealed {
                issues.push(format!("stage '{}' is running without a total", stage.name));
            }
        }
    }

    for stage in job.stages.iter().filter(|s| s.status == StageStatus::Failed) {
        issues.push(format!("stage '{}' failed", stage.name));
    }
    if !job.errors.is_empty() {
        issues.push(format!("{} error(s) recorded", job.errors.len()));
    }

    JobHealth {
        job_id: job.id.clone(),
        status: job.status,
        is_stuck,
        is_timed_out,
        elapsed_secs,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{STAGE_CACHE, STAGE_THUMBNAIL};

    fn thresholds() -> HealthThresholds {
        HealthThresholds {
            stuck_after: Duration::from_secs(60),
            timeout_after: Duration::from_secs(600),
        }
    }

    fn running_job(started_secs_ago: i64, now: DateTime<Utc>) -> JobRecord {
        let mut job =
            JobRecord::multi_stage("resume-collection", &[STAGE_THUMBNAIL, STAGE_CACHE]).unwrap();
        job.status = JobStatus::InProgress;
        job.started_at = Some(now - chrono::Duration::seconds(started_secs_ago));
        for stage in &mut job.stages {
            stage.sealed = true;
            stage.total = 1;
        }
        job
    }

    #[test]
    fn test_fresh_job_is_healthy() {
        let now = Utc::now();
        let health = assess(&running_job(10, now), now, &thresholds());
        assert!(!health.is_stuck);
        assert!(!health.is_timed_out);
        assert!(health.is_healthy());
        assert_eq!(health.elapsed_secs, Some(10));
    }

    #[test]
    fn test_stuck_then_timed_out() {
        let now = Utc::now();
        let stuck = assess(&running_job(120, now), now, &thresholds());
        assert!(stuck.is_stuck);
        assert!(!stuck.is_timed_out);

        let timed_out = assess(&running_job(1200, now), now, &thresholds());
        assert!(timed_out.is_stuck);
        assert!(timed_out.is_timed_out);
        assert_eq!(timed_out.issues.len(), 2);
    }

    #[test]
    fn test_terminal_job_is_never_stuck() {
        let now = Utc::now();
        let mut job = running_job(5000, now);
        job.status = JobStatus::Completed;
        let health = assess(&job, now, &thresholds());
        assert!(!health.is_stuck);
        assert!(!health.is_timed_out);
    }

    #[test]
    fn test_unstarted_job_is_not_stuck() {
        let now = Utc::now();
        let job = JobRecord::single("export").unwrap();
        let health = assess(&job, now, &thresholds());
        assert!(!health.is_stuck);
        assert_eq!(health.elapsed_secs, None);
    }

    #[test]
    fn test_failed_stage_and_errors_are_reported() {
        let now = Utc::now();
        let mut job = running_job(1, now);
        job.stage_mut(STAGE_CACHE).unwrap().status = StageStatus::Failed;
        job.errors.push("disk full".to_string());
        let health = assess(&job, now, &thresholds());
        assert!(!health.is_healthy());
        assert!(health.issues.iter().any(|i| i.contains("cache")));
        assert!(health.issues.iter().any(|i| i.contains("1 error")));
    }
}
