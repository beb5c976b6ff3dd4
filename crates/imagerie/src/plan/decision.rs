use serde::{Deserialize, Serialize};

use super::gaps::GapReport;
use crate::collection::CollectionId;

/// Caller flags for a bulk ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFlags {
    /// Rescan collections that already exist, discarding their items.
    #[serde(default)]
    pub overwrite_existing: bool,
    /// Fill thumbnail/cache gaps of collections that already exist.
    #[serde(default)]
    pub resume_incomplete: bool,
}

/// The decision without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    CreateNew,
    ForceRescan,
    Resume,
    SkipComplete,
    ScanFresh,
    SkipAlreadyScanned,
}

/// What to do with one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ResumeDecision {
    /// Register the collection and queue a full scan.
    CreateNew { collection_id: CollectionId },
    /// Clear the collection's items and artifacts and queue a full scan.
    ForceRescan { collection_id: CollectionId },
    /// Dispatch one item message per gap; no rescan.
    Resume {
        collection_id: CollectionId,
        gaps: GapReport,
    },
    SkipComplete { collection_id: CollectionId },
    /// Existing metadata, no items yet: queue a full scan.
    ScanFresh { collection_id: CollectionId },
    SkipAlreadyScanned { collection_id: CollectionId },
}

impl ResumeDecision {
    pub fn collection_id(&self) -> CollectionId {
        match self {
            ResumeDecision::CreateNew { collection_id }
            | ResumeDecision::ForceRescan { collection_id }
            | ResumeDecision::Resume { collection_id, .. }
            | ResumeDecision::SkipComplete { collection_id }
            | ResumeDecision::ScanFresh { collection_id }
            | ResumeDecision::SkipAlreadyScanned { collection_id } => *collection_id,
        }
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            ResumeDecision::CreateNew { .. } => DecisionKind::CreateNew,
            ResumeDecision::ForceRescan { .. } => DecisionKind::ForceRescan,
            ResumeDecision::Resume { .. } => DecisionKind::Resume,
            ResumeDecision::SkipComplete { .. } => DecisionKind::SkipComplete,
            ResumeDecision::ScanFresh { .. } => DecisionKind::ScanFresh,
            ResumeDecision::SkipAlreadyScanned { .. } => DecisionKind::SkipAlreadyScanned,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ResumeDecision::SkipComplete { .. } | ResumeDecision::SkipAlreadyScanned { .. }
        )
    }

    /// True for the decisions that dispatch a full scan request.
    pub fn needs_scan(&self) -> bool {
        matches!(
            self,
            ResumeDecision::CreateNew { .. }
                | ResumeDecision::ForceRescan { .. }
                | ResumeDecision::ScanFresh { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResumeDecision::CreateNew { .. } => "create_new",
            ResumeDecision::ForceRescan { .. } => "force_rescan",
            ResumeDecision::Resume { .. } => "resume",
            ResumeDecision::SkipComplete { .. } => "skip_complete",
            ResumeDecision::ScanFresh { .. } => "scan_fresh",
            ResumeDecision::SkipAlreadyScanned { .. } => "skip_already_scanned",
        }
    }
}

impl std::fmt::Display for ResumeDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
