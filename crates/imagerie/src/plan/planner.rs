//! Deterministic classification of a candidate against existing state.

use log::debug;

use super::decision::{DecisionKind, PlanFlags, ResumeDecision};
use super::gaps::compute_gaps;
use crate::collection::{Collection, CollectionId};
use crate::scan::CandidateCollection;

/// Everything the decision depends on, and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanInputs {
    pub existing: bool,
    pub has_images: bool,
    pub overwrite_existing: bool,
    pub resume_incomplete: bool,
    pub missing_thumbnails: usize,
    pub missing_cache: usize,
}

/// First matching row wins.
pub fn decide(inputs: &PlanInputs) -> DecisionKind {
    if !inputs.existing {
        return DecisionKind::CreateNew;
    }
    if inputs.overwrite_existing {
        return DecisionKind::ForceRescan;
    }
    match (inputs.has_images, inputs.resume_incomplete) {
        (true, true) if inputs.missing_thumbnails + inputs.missing_cache > 0 => {
            DecisionKind::Resume
        }
        (true, true) => DecisionKind::SkipComplete,
        (false, _) => DecisionKind::ScanFresh,
        (true, false) => DecisionKind::SkipAlreadyScanned,
    }
}

/// Plans one candidate. Pure: the same arguments always give the same
/// decision, and nothing is read or written.
pub fn plan_resume(
    candidate: &CandidateCollection,
    existing: Option<&Collection>,
    flags: PlanFlags,
) -> ResumeDecision {
    let Some(collection) = existing else {
        return ResumeDecision::CreateNew {
            collection_id: CollectionId::for_path(&candidate.path),
        };
    };

    let collection_id = collection.id;
    let has_images = collection.has_images();
    // Gaps only matter on the resume path.
    let gaps = (has_images && flags.resume_incomplete && !flags.overwrite_existing)
        .then(|| compute_gaps(collection))
        .unwrap_or_default();

    let inputs = PlanInputs {
        existing: true,
        has_images,
        overwrite_existing: flags.overwrite_existing,
        resume_incomplete: flags.resume_incomplete,
        missing_thumbnails: gaps.missing_thumbnails.len(),
        missing_cache: gaps.missing_cache.len(),
    };
    let kind = decide(&inputs);
    debug!(
        "Planned {} for {} ({:?})",
        candidate.name,
        collection_id,
        kind
    );

    match kind {
        DecisionKind::CreateNew => ResumeDecision::CreateNew { collection_id },
        DecisionKind::ForceRescan => ResumeDecision::ForceRescan { collection_id },
        DecisionKind::Resume => ResumeDecision::Resume {
            collection_id,
            gaps,
        },
        DecisionKind::SkipComplete => ResumeDecision::SkipComplete { collection_id },
        DecisionKind::ScanFresh => ResumeDecision::ScanFresh { collection_id },
        DecisionKind::SkipAlreadyScanned => ResumeDecision::SkipAlreadyScanned { collection_id },
    }
}
