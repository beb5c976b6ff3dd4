//! Name-based content tests shared by the folder and archive passes.

use std::collections::HashSet;
use std::path::Path;

use crate::config::ScanConfig;

/// Decides which file and archive-entry names count as images.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    image_extensions: HashSet<String>,
    ignored_prefixes: Vec<String>,
    ignored_names: HashSet<String>,
}

impl ContentFilter {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            image_extensions: config
                .image_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignored_prefixes: config.ignored_entry_prefixes.clone(),
            ignored_names: config
                .ignored_entry_names
                .iter()
                .map(|n| n.to_ascii_lowercase())
                .collect(),
        }
    }

    /// True for platform metadata (resource forks, Finder and Explorer
    /// caches) that would otherwise look like images.
    pub fn is_metadata_entry(&self, entry: &str) -> bool {
        let normalized = entry.replace('\\', "/");
        if self
            .ignored_prefixes
            .iter()
            .any(|p| normalized.starts_with(p.as_str()) || normalized.contains(&format!("/{}", p)))
        {
            return true;
        }

        let base = normalized.rsplit('/').next().unwrap_or(&normalized);
        base.starts_with("._") || self.ignored_names.contains(&base.to_ascii_lowercase())
    }

    /// True when an archive entry name is a real image.
    pub fn is_image_entry(&self, entry: &str) -> bool {
        if entry.ends_with('/') || self.is_metadata_entry(entry) {
            return false;
        }
        let base = entry.rsplit(['/', '\\']).next().unwrap_or(entry);
        match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.image_extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }

    /// True when a file on disk is a real image.
    pub fn is_image_path(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.is_image_entry(n))
            .unwrap_or(false)
    }
}

/// Case-insensitive substring match used by the optional name filter.
pub fn matches_name_filter(name: &str, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(f) if f.is_empty() => true,
        Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
    }
}
