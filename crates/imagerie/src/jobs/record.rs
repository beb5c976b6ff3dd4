//! The persisted job entity and its per-stage state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{JobStatus, StageStatus};
use crate::error::JobError;

/// Job type tag for a full collection scan.
pub const JOB_TYPE_COLLECTION_SCAN: &str = "collection-scan";
/// Job type tag for a targeted thumbnail/cache gap fill.
pub const JOB_TYPE_RESUME_COLLECTION: &str = "resume-collection";

pub const STAGE_SCAN: &str = "scan";
pub const STAGE_THUMBNAIL: &str = "thumbnail";
pub const STAGE_CACHE: &str = "cache";

/// Counters and lifecycle of one named stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    pub name: String,
    pub status: StageStatus,
    /// Number of work items; `0` while unseeded.
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    /// Set once `total` has been seeded by a start call.
    pub sealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            total: 0,
            completed: 0,
            failed: 0,
            sealed: false,
            started_at: None,
            completed_at: None,
            message: None,
        }
    }

    /// Items that reached an outcome, successful or not.
    pub fn processed(&self) -> u64 {
        self.completed.saturating_add(self.failed)
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed())
    }
}

/// A tracked unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub job_type: String,
    pub is_multi_stage: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Ordered and fixed at creation.
    pub stages: Vec<StageState>,
    pub status: JobStatus,
    /// Overall counters, meaningful only for single-stage jobs.
    pub total_items: u64,
    pub completed_items: u64,
    pub failed_items: u64,
    /// Append-only.
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optimistic concurrency token, bumped by every whole-record write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_flagged_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn new_internal(job_type: &str, is_multi_stage: bool, stages: Vec<StageState>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.to_string(),
            is_multi_stage,
            collection_id: None,
            stages,
            status: JobStatus::Pending,
            total_items: 0,
            completed_items: 0,
            failed_items: 0,
            errors: Vec::new(),
            message: None,
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            stale_flagged_at: None,
        }
    }

    /// Creates a pending multi-stage job. Stage names must be non-empty and
    /// unique.
    pub fn multi_stage(job_type: &str, stage_names: &[&str]) -> Result<Self, JobError> {
        if job_type.trim().is_empty() {
            return Err(JobError::Validation("job type must not be empty".to_string()));
        }
        if stage_names.is_empty() {
            return Err(JobError::Validation(
                "multi-stage job needs at least one stage".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in stage_names {
            if name.trim().is_empty() {
                return Err(JobError::Validation("stage name must not be empty".to_string()));
            }
            if !seen.insert(*name) {
                return Err(JobError::Validation(format!("duplicate stage '{}'", name)));
            }
        }

        let stages = stage_names.iter().map(|name| StageState::new(name)).collect();
        Ok(Self::new_internal(job_type, true, stages))
    }

    /// Creates a pending job tracked by the overall item counters only.
    pub fn single(job_type: &str) -> Result<Self, JobError> {
        if job_type.trim().is_empty() {
            return Err(JobError::Validation("job type must not be empty".to_string()));
        }
        Ok(Self::new_internal(job_type, false, Vec::new()))
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn stage(&self, name: &str) -> Option<&StageState> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageState> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of seeded work that has reached an outcome, if any work is seeded.
    pub fn progress_fraction(&self) -> Option<f64> {
        let (done, total) = if self.is_multi_stage {
            self.stages
                .iter()
                .filter(|s| s.sealed)
                .fold((0u64, 0u64), |(d, t), s| {
                    (d.saturating_add(s.processed()), t.saturating_add(s.total))
                })
        } else {
            (
                self.completed_items.saturating_add(self.failed_items),
                self.total_items,
            )
        };

        if total == 0 {
            None
        } else {
            Some((done as f64 / total as f64).min(1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_stage_keeps_order() {
        let job = JobRecord::multi_stage(
            JOB_TYPE_COLLECTION_SCAN,
            &[STAGE_SCAN, STAGE_THUMBNAIL, STAGE_CACHE],
        )
        .unwrap();

        let names: Vec<&str> = job.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["scan", "thumbnail", "cache"]);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.is_multi_stage);
    }

    #[test]
    fn test_multi_stage_rejects_duplicates_and_empty() {
        assert!(JobRecord::multi_stage("x", &[]).is_err());
        assert!(JobRecord::multi_stage("x", &["a", "a"]).is_err());
        assert!(JobRecord::multi_stage("", &["a"]).is_err());
    }

    #[test]
    fn test_progress_fraction_counts_sealed_stages_only() {
        let mut job = JobRecord::multi_stage("x", &["a", "b"]).unwrap();
        assert_eq!(job.progress_fraction(), None);

        let a = job.stage_mut("a").unwrap();
        a.sealed = true;
        a.total = 4;
        a.completed = 1;
        a.failed = 1;

        let b = job.stage_mut("b").unwrap();
        b.completed = 7;

        assert_eq!(job.progress_fraction(), Some(0.5));
    }

    #[test]
    fn test_serializes_camel_case() {
        let job = JobRecord::single("import").unwrap().with_collection("c1");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["jobType"], "import");
        assert_eq!(json["collectionId"], "c1");
        assert_eq!(json["isMultiStage"], false);
    }
}
