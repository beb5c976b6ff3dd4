use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::collection::CollectionId;
use crate::scan::CollectionKind;

/// A unit of external work. Every message carries the job id and stage it
/// reports progress against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkMessage {
    /// Full scan of a collection; the worker reports on the `scan` stage.
    ScanCollection {
        job_id: String,
        collection_id: CollectionId,
        path: PathBuf,
        kind: CollectionKind,
        force_rescan: bool,
    },
    /// Produce one artifact (thumbnail or cache image) for one item.
    ProcessItem {
        job_id: String,
        stage: String,
        collection_id: CollectionId,
        item_id: String,
    },
}

impl WorkMessage {
    pub fn job_id(&self) -> &str {
        match self {
            WorkMessage::ScanCollection { job_id, .. } | WorkMessage::ProcessItem { job_id, .. } => {
                job_id
            }
        }
    }

    pub fn stage(&self) -> &str {
        match self {
            WorkMessage::ScanCollection { .. } => crate::jobs::STAGE_SCAN,
            WorkMessage::ProcessItem { stage, .. } => stage,
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, WorkMessage::ScanCollection { .. })
    }
}
