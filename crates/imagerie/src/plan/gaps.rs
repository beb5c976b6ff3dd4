//! Which active items still lack a thumbnail or cache image.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::collection::Collection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapReport {
    /// Item ids, in collection order.
    pub missing_thumbnails: Vec<String>,
    pub missing_cache: Vec<String>,
}

impl GapReport {
    pub fn is_empty(&self) -> bool {
        self.missing_thumbnails.is_empty() && self.missing_cache.is_empty()
    }

    /// Number of item messages a gap fill dispatches.
    pub fn total(&self) -> usize {
        self.missing_thumbnails.len() + self.missing_cache.len()
    }
}

/// Set difference of active item ids against each artifact list.
///
/// Artifacts that point at deleted or unknown items are ignored.
pub fn compute_gaps(collection: &Collection) -> GapReport {
    let thumbnails: HashSet<&str> = collection
        .thumbnails
        .iter()
        .map(|a| a.image_id.as_str())
        .collect();
    let cached: HashSet<&str> = collection
        .cache_images
        .iter()
        .map(|a| a.image_id.as_str())
        .collect();

    let mut report = GapReport::default();
    let mut seen = HashSet::new();
    for image in collection.active_images() {
        if !seen.insert(image.id.as_str()) {
            continue;
        }
        if !thumbnails.contains(image.id.as_str()) {
            report.missing_thumbnails.push(image.id.clone());
        }
        if !cached.contains(image.id.as_str()) {
            report.missing_cache.push(image.id.clone());
        }
    }
    report
}
