//! Persisted collection documents and their item/artifact references.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scan::{CandidateCollection, CollectionKind};

/// Stable identity of a collection.
///
/// Derived from the source path (UUID v5), so planning the same candidate
/// twice names the same collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Uuid);

impl CollectionId {
    pub fn for_path(path: &Path) -> Self {
        Self(Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            path.to_string_lossy().as_bytes(),
        ))
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One image inside a collection. Soft-deleted items stay in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub deleted: bool,
}

impl ImageEntry {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            deleted: false,
        }
    }
}

/// A derived artifact (thumbnail or cache image) generated for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    pub image_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ArtifactRef {
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub path: PathBuf,
    pub kind: CollectionKind,
    pub images: Vec<ImageEntry>,
    pub thumbnails: Vec<ArtifactRef>,
    pub cache_images: Vec<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    /// Registers a freshly discovered candidate with no items yet.
    pub fn from_candidate(candidate: &CandidateCollection) -> Self {
        let now = Utc::now();
        Self {
            id: CollectionId::for_path(&candidate.path),
            name: candidate.name.clone(),
            path: candidate.path.clone(),
            kind: candidate.kind,
            images: Vec::new(),
            thumbnails: Vec::new(),
            cache_images: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn active_images(&self) -> impl Iterator<Item = &ImageEntry> {
        self.images.iter().filter(|i| !i.deleted)
    }

    pub fn has_images(&self) -> bool {
        self.active_images().next().is_some()
    }

    pub fn clear_artifacts(&mut self) {
        self.images.clear();
        self.thumbnails.clear();
        self.cache_images.clear();
        self.updated_at = Utc::now();
    }
}
