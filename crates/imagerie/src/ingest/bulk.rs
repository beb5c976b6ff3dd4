//! Bulk ingestion: scan a parent path, plan every candidate, and carry
//! out each decision.
//!
//! One candidate failing never stops the run; its failure is reported in
//! the result and the next candidate is processed.

use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::dispatch::WorkPublisher;
use super::message::WorkMessage;
use crate::collection::{Collection, CollectionId};
use crate::db::CollectionRepository;
use crate::error::IngestError;
use crate::jobs::{
    JobRecord, JobTracker, JOB_TYPE_COLLECTION_SCAN, JOB_TYPE_RESUME_COLLECTION, STAGE_CACHE,
    STAGE_SCAN, STAGE_THUMBNAIL,
};
use crate::plan::{plan_resume, DecisionKind, GapReport, PlanFlags, ResumeDecision};
use crate::scan::{CandidateCollection, CandidateScanner, CollectionKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIngestRequest {
    pub parent_path: PathBuf,
    #[serde(default)]
    pub include_subfolders: bool,
    /// Case-insensitive substring filter on candidate names.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub flags: PlanFlags,
}

impl BulkIngestRequest {
    pub fn new(parent_path: impl Into<PathBuf>) -> Self {
        Self {
            parent_path: parent_path.into(),
            include_subfolders: false,
            prefix: None,
            flags: PlanFlags::default(),
        }
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.parent_path.as_os_str().is_empty() {
            return Err(IngestError::Validation("parent path must not be empty".to_string()));
        }
        if let Some(prefix) = &self.prefix {
            if prefix.contains(['/', '\\']) {
                return Err(IngestError::Validation(format!(
                    "name filter must not contain path separators: {}",
                    prefix
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Resumed,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateOutcome {
    pub name: String,
    pub path: PathBuf,
    pub kind: CollectionKind,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<CollectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Work messages successfully handed to the publisher.
    pub dispatched: usize,
    pub message: String,
}

impl CandidateOutcome {
    fn new(candidate: &CandidateCollection, status: OutcomeStatus, message: String) -> Self {
        Self {
            name: candidate.name.clone(),
            path: candidate.path.clone(),
            kind: candidate.kind,
            status,
            decision: None,
            collection_id: None,
            job_id: None,
            dispatched: 0,
            message,
        }
    }

    fn for_decision(
        candidate: &CandidateCollection,
        decision: &ResumeDecision,
        status: OutcomeStatus,
        message: String,
    ) -> Self {
        let mut outcome = Self::new(candidate, status, message);
        outcome.decision = Some(decision.kind());
        outcome.collection_id = Some(decision.collection_id());
        outcome
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIngestResult {
    pub outcomes: Vec<CandidateOutcome>,
    pub success_count: usize,
    pub resumed_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    /// Directory entries or archives the scanner could not read.
    pub unreadable_entries: usize,
}

impl BulkIngestResult {
    fn push(&mut self, outcome: CandidateOutcome) {
        match outcome.status {
            OutcomeStatus::Success => self.success_count += 1,
            OutcomeStatus::Resumed => self.resumed_count += 1,
            OutcomeStatus::Skipped => self.skipped_count += 1,
            OutcomeStatus::Error => self.error_count += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

pub struct BulkIngestor {
    scanner: CandidateScanner,
    collections: Arc<dyn CollectionRepository>,
    tracker: Arc<JobTracker>,
    publisher: Arc<dyn WorkPublisher>,
}

impl BulkIngestor {
    pub fn new(
        scanner: CandidateScanner,
        collections: Arc<dyn CollectionRepository>,
        tracker: Arc<JobTracker>,
        publisher: Arc<dyn WorkPublisher>,
    ) -> Self {
        Self {
            scanner,
            collections,
            tracker,
            publisher,
        }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Runs a bulk ingestion.
    ///
    /// Only request validation and a missing or non-directory parent path
    /// fail the whole call; everything else becomes a per-candidate outcome.
    pub fn ingest(&self, request: &BulkIngestRequest) -> Result<BulkIngestResult, IngestError> {
        request.validate()?;

        let span = tracing::info_span!(
            "bulk_ingest",
            root = %request.parent_path.display(),
            subfolders = request.include_subfolders
        );
        let _enter = span.enter();

        let mut candidates = self.scanner.scan(
            &request.parent_path,
            request.include_subfolders,
            request.prefix.as_deref(),
        )?;

        let mut result = BulkIngestResult::default();
        for candidate in candidates.by_ref() {
            let outcome = match self.ingest_candidate(&candidate, request.flags) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Failed to ingest {}: {}", candidate.path.display(), e);
                    CandidateOutcome::new(&candidate, OutcomeStatus::Error, e.to_string())
                }
            };
            result.push(outcome);
        }
        result.unreadable_entries = candidates.skipped();

        info!(
            "Bulk ingest of {}: {} candidate(s), {} new, {} resumed, {} skipped, {} failed",
            request.parent_path.display(),
            result.total(),
            result.success_count,
            result.resumed_count,
            result.skipped_count,
            result.error_count
        );
        Ok(result)
    }

    /// Plans and executes a single candidate.
    pub fn ingest_candidate(
        &self,
        candidate: &CandidateCollection,
        flags: PlanFlags,
    ) -> Result<CandidateOutcome, IngestError> {
        let existing = self.collections.find_by_path(&candidate.path)?;
        let decision = plan_resume(candidate, existing.as_ref(), flags);
        self.execute(candidate, decision)
    }

    /// Carries out a decision's side effects.
    pub fn execute(
        &self,
        candidate: &CandidateCollection,
        decision: ResumeDecision,
    ) -> Result<CandidateOutcome, IngestError> {
        match &decision {
            ResumeDecision::CreateNew { .. } => {
                let collection = Collection::from_candidate(candidate);
                self.collections.insert(&collection)?;
                self.start_scan(candidate, &decision, false)
            }
            ResumeDecision::ForceRescan { collection_id } => {
                self.collections.clear_artifacts(collection_id)?;
                self.start_scan(candidate, &decision, true)
            }
            ResumeDecision::ScanFresh { .. } => self.start_scan(candidate, &decision, false),
            ResumeDecision::Resume {
                collection_id,
                gaps,
            } => self.start_resume(candidate, &decision, *collection_id, gaps),
            ResumeDecision::SkipComplete { .. } => Ok(CandidateOutcome::for_decision(
                candidate,
                &decision,
                OutcomeStatus::Skipped,
                "Already complete, nothing to resume".to_string(),
            )),
            ResumeDecision::SkipAlreadyScanned { .. } => Ok(CandidateOutcome::for_decision(
                candidate,
                &decision,
                OutcomeStatus::Skipped,
                "Already scanned".to_string(),
            )),
        }
    }

    /// One scan job, one scan message. A failed dispatch fails the scan
    /// stage so the job does not linger as pending.
    fn start_scan(
        &self,
        candidate: &CandidateCollection,
        decision: &ResumeDecision,
        force_rescan: bool,
    ) -> Result<CandidateOutcome, IngestError> {
        let collection_id = decision.collection_id();
        let job = JobRecord::multi_stage(
            JOB_TYPE_COLLECTION_SCAN,
            &[STAGE_SCAN, STAGE_THUMBNAIL, STAGE_CACHE],
        )?
        .with_collection(collection_id.to_string());
        self.tracker.create_job(&job)?;
        self.tracker.start_stage(
            &job.id,
            STAGE_SCAN,
            1,
            Some(&format!("Scanning {}", candidate.name)),
        )?;

        let message = WorkMessage::ScanCollection {
            job_id: job.id.clone(),
            collection_id,
            path: candidate.path.clone(),
            kind: candidate.kind,
            force_rescan,
        };

        let mut outcome = match self.publisher.publish(message) {
            Ok(()) => {
                let mut outcome = CandidateOutcome::for_decision(
                    candidate,
                    decision,
                    OutcomeStatus::Success,
                    format!("Queued {} for scanning", candidate.name),
                );
                outcome.dispatched = 1;
                outcome
            }
            Err(e) => {
                let reason = format!("scan dispatch failed: {}", e);
                warn!("{} ({})", reason, candidate.path.display());
                self.tracker.fail_stage(&job.id, STAGE_SCAN, &reason)?;
                CandidateOutcome::for_decision(candidate, decision, OutcomeStatus::Error, reason)
            }
        };
        outcome.job_id = Some(job.id);
        Ok(outcome)
    }

    /// One resume job with thumbnail and cache stages sized to the gaps,
    /// and one item message per gap. Never dispatches a scan.
    fn start_resume(
        &self,
        candidate: &CandidateCollection,
        decision: &ResumeDecision,
        collection_id: CollectionId,
        gaps: &GapReport,
    ) -> Result<CandidateOutcome, IngestError> {
        let job = JobRecord::multi_stage(JOB_TYPE_RESUME_COLLECTION, &[STAGE_THUMBNAIL, STAGE_CACHE])?
            .with_collection(collection_id.to_string());
        self.tracker.create_job(&job)?;

        let stages = [
            (STAGE_THUMBNAIL, &gaps.missing_thumbnails),
            (STAGE_CACHE, &gaps.missing_cache),
        ];

        for (stage, items) in stages {
            if items.is_empty() {
                self.tracker
                    .complete_stage(&job.id, stage, Some("Nothing missing"))?;
            } else {
                self.tracker.start_stage(
                    &job.id,
                    stage,
                    items.len() as u64,
                    Some(&format!("Generating {} missing {} item(s)", items.len(), stage)),
                )?;
            }
        }

        let mut dispatched = 0;
        let mut failed = 0;
        for (stage, items) in stages {
            for item_id in items {
                let message = WorkMessage::ProcessItem {
                    job_id: job.id.clone(),
                    stage: stage.to_string(),
                    collection_id,
                    item_id: item_id.clone(),
                };
                match self.publisher.publish(message) {
                    Ok(()) => dispatched += 1,
                    Err(e) => {
                        failed += 1;
                        let error = format!("dispatch of {} for {} failed: {}", stage, item_id, e);
                        self.tracker.record_stage_failure(&job.id, stage, 1, &error);
                    }
                }
            }
        }

        let (status, message) = if dispatched == 0 && failed > 0 {
            (
                OutcomeStatus::Error,
                format!("All {} item dispatch(es) failed", failed),
            )
        } else if failed > 0 {
            (
                OutcomeStatus::Resumed,
                format!(
                    "Resumed {} missing item(s), {} dispatch(es) failed",
                    dispatched, failed
                ),
            )
        } else {
            (
                OutcomeStatus::Resumed,
                format!(
                    "Resumed {} missing thumbnail(s) and {} missing cache image(s)",
                    gaps.missing_thumbnails.len(),
                    gaps.missing_cache.len()
                ),
            )
        };

        info!(
            "Resume job {} for {}: {} dispatched, {} failed",
            job.id, candidate.name, dispatched, failed
        );

        let mut outcome = CandidateOutcome::for_decision(candidate, decision, status, message);
        outcome.job_id = Some(job.id);
        outcome.dispatched = dispatched;
        Ok(outcome)
    }
}

impl std::fmt::Debug for BulkIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkIngestor").finish_non_exhaustive()
    }
}
