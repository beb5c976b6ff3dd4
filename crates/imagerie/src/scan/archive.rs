//! Archive listing seam.
//!
//! The scanner only needs entry names, never entry contents, so the
//! collaborator contract is a single listing call.

use std::fs::File;
use std::path::Path;

use crate::error::ArchiveError;
use crate::scan::CollectionKind;

/// Lists the entry names of an archive file.
pub trait ArchiveReader: Send + Sync {
    fn list_entries(&self, path: &Path, kind: CollectionKind) -> Result<Vec<String>, ArchiveError>;

    /// Existence probe used for the scan root.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Reads zip-family archives (`.zip`, `.cbz`). Other formats report
/// [`ArchiveError::Unsupported`] and are skipped by the scanner.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveReader;

impl ArchiveReader for ZipArchiveReader {
    fn list_entries(&self, path: &Path, kind: CollectionKind) -> Result<Vec<String>, ArchiveError> {
        if kind != CollectionKind::Zip {
            return Err(ArchiveError::Unsupported {
                path: path.to_path_buf(),
                kind: kind.to_string(),
            });
        }

        let file = File::open(path).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(archive.file_names().map(str::to_string).collect())
    }
}
