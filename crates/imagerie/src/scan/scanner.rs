use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::scan::archive::ArchiveReader;
use crate::scan::filters::{matches_name_filter, ContentFilter};
use crate::scan::{CandidateCollection, CollectionKind};

/// Finds leaf content folders and image-bearing archives under a parent path.
pub struct CandidateScanner {
    filter: ContentFilter,
    reader: Arc<dyn ArchiveReader>,
}

impl CandidateScanner {
    pub fn new(config: &ScanConfig, reader: Arc<dyn ArchiveReader>) -> Self {
        Self {
            filter: ContentFilter::new(config),
            reader,
        }
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    /// Starts a single-pass scan of `parent`.
    ///
    /// The only fatal error is a missing or non-directory parent; everything
    /// that goes wrong below it is logged and the offending entry skipped.
    pub fn scan<P: AsRef<Path>>(
        &self,
        parent: P,
        include_subfolders: bool,
        name_filter: Option<&str>,
    ) -> Result<Candidates<'_>, ScanError> {
        let parent = parent.as_ref();
        if !self.reader.exists(parent) {
            return Err(ScanError::ParentNotFound(parent.to_path_buf()));
        }
        if !parent.is_dir() {
            return Err(ScanError::NotADirectory(parent.to_path_buf()));
        }

        let max_depth = if include_subfolders { usize::MAX } else { 1 };
        let walker = || {
            WalkDir::new(parent)
                .min_depth(1)
                .max_depth(max_depth)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
        };

        info!(
            "Scanning {} for candidates (subfolders: {}, filter: {:?})",
            parent.display(),
            include_subfolders,
            name_filter
        );

        Ok(Candidates {
            scanner: self,
            root: parent.to_path_buf(),
            name_filter: name_filter.filter(|f| !f.is_empty()).map(str::to_string),
            folders: walker(),
            archives: walker(),
            folders_done: false,
            skipped: 0,
        })
    }

    fn folder_candidate(&self, dir: &Path) -> Result<Option<CandidateCollection>, ScanError> {
        let entries = std::fs::read_dir(dir).map_err(|e| ScanError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        // Only direct children count, so ancestors of content folders never qualify.
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && self.filter.is_image_path(&path) {
                return Ok(Some(CandidateCollection::folder(dir)));
            }
        }
        Ok(None)
    }

    fn archive_candidate(
        &self,
        path: &Path,
        kind: CollectionKind,
    ) -> Result<Option<CandidateCollection>, ScanError> {
        let entries = self.reader.list_entries(path, kind)?;
        if entries.iter().any(|e| self.filter.is_image_entry(e)) {
            Ok(Some(CandidateCollection::archive(path, kind)))
        } else {
            debug!("Archive has no images: {}", path.display());
            Ok(None)
        }
    }
}

/// Lazy candidate sequence: every qualifying folder first, then every
/// qualifying archive. Not restartable.
pub struct Candidates<'a> {
    scanner: &'a CandidateScanner,
    root: PathBuf,
    name_filter: Option<String>,
    folders: walkdir::IntoIter,
    archives: walkdir::IntoIter,
    folders_done: bool,
    skipped: usize,
}

impl Candidates<'_> {
    /// Entries skipped so far because they could not be read.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn passes_name_filter(&self, entry: &DirEntry) -> bool {
        matches_name_filter(
            &entry.file_name().to_string_lossy(),
            self.name_filter.as_deref(),
        )
    }

    fn next_folder(&mut self) -> Option<CandidateCollection> {
        while let Some(entry) = self.folders.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    self.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_dir() || !self.passes_name_filter(&entry) {
                continue;
            }

            match self.scanner.folder_candidate(entry.path()) {
                Ok(Some(candidate)) => {
                    debug!("Found folder candidate: {}", candidate.path.display());
                    return Some(candidate);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping folder: {}", e);
                    self.skipped += 1;
                }
            }
        }
        None
    }

    fn next_archive(&mut self) -> Option<CandidateCollection> {
        while let Some(entry) = self.archives.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    self.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(kind) = CollectionKind::from_path(entry.path()) else {
                continue;
            };
            // Cheap rejection before the archive is opened.
            if !self.passes_name_filter(&entry) {
                continue;
            }

            match self.scanner.archive_candidate(entry.path(), kind) {
                Ok(Some(candidate)) => {
                    debug!("Found archive candidate: {}", candidate.path.display());
                    return Some(candidate);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping archive: {}", e);
                    self.skipped += 1;
                }
            }
        }
        None
    }
}

impl Iterator for Candidates<'_> {
    type Item = CandidateCollection;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.folders_done {
            if let Some(candidate) = self.next_folder() {
                return Some(candidate);
            }
            self.folders_done = true;
        }
        self.next_archive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ZipArchiveReader;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn scanner() -> CandidateScanner {
        CandidateScanner::new(&ScanConfig::default(), Arc::new(ZipArchiveReader))
    }

    fn write_zip(path: &Path, entries: &[&str]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for name in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(b"x").unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_missing_parent_is_fatal() {
        let dir = TempDir::new().unwrap();
        let s = scanner();
        let result = s.scan(dir.path().join("missing"), true, None);
        assert!(matches!(result, Err(ScanError::ParentNotFound(_))));
    }

    #[test]
    fn test_file_parent_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"x").unwrap();
        let s = scanner();
        let result = s.scan(&file, true, None);
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_empty_parent_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let found: Vec<_> = scanner().scan(dir.path(), true, None).unwrap().collect();
        assert!(found.is_empty());
    }

    #[test]
    fn test_only_leaf_folders_with_direct_images() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("A");
        let b = a.join("B");
        fs::create_dir_all(&b).unwrap();
        for i in 0..3 {
            fs::write(b.join(format!("{}.jpg", i)), b"img").unwrap();
        }

        let s = scanner();
        let found: Vec<_> = s.scan(dir.path(), true, None).unwrap().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, b);
        assert_eq!(found[0].kind, CollectionKind::Folder);

        let top_level: Vec<_> = s.scan(dir.path(), false, None).unwrap().collect();
        assert!(top_level.is_empty());
    }

    #[test]
    fn test_resource_forks_do_not_qualify_a_folder() {
        let dir = TempDir::new().unwrap();
        let forks = dir.path().join("forks");
        fs::create_dir(&forks).unwrap();
        fs::write(forks.join("._001.jpg"), b"fork").unwrap();

        let found: Vec<_> = scanner().scan(dir.path(), true, None).unwrap().collect();
        assert!(found.is_empty());
    }

    #[test]
    fn test_archives_with_images_only() {
        let dir = TempDir::new().unwrap();
        write_zip(&dir.path().join("good.zip"), &["p/001.png"]);
        write_zip(&dir.path().join("text.zip"), &["notes.txt"]);
        write_zip(
            &dir.path().join("mac.zip"),
            &["__MACOSX/p/._001.png", "p/readme.md"],
        );

        let found: Vec<_> = scanner().scan(dir.path(), false, None).unwrap().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "good");
        assert_eq!(found[0].kind, CollectionKind::Zip);
    }

    #[test]
    fn test_name_filter_applies_before_open() {
        let dir = TempDir::new().unwrap();
        write_zip(&dir.path().join("Summer_Album.zip"), &["001.jpg"]);
        write_zip(&dir.path().join("winter.zip"), &["001.jpg"]);
        // Would be skipped as corrupt if it were opened.
        fs::write(dir.path().join("broken.zip"), b"garbage").unwrap();

        let s = scanner();
        let mut candidates = s.scan(dir.path(), false, Some("ALBUM")).unwrap();
        let found: Vec<_> = candidates.by_ref().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Summer_Album");
        assert_eq!(candidates.skipped(), 0);
    }

    #[test]
    fn test_unsupported_archive_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("set.rar"), b"rar bytes").unwrap();
        write_zip(&dir.path().join("set.zip"), &["1.gif"]);

        let s = scanner();
        let mut candidates = s.scan(dir.path(), false, None).unwrap();
        let found: Vec<_> = candidates.by_ref().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(candidates.skipped(), 1);
    }
}
