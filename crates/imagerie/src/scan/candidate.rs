use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a collection's images are stored on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Folder,
    Zip,
    #[serde(rename = "7z")]
    SevenZip,
    Rar,
    Tar,
}

impl CollectionKind {
    /// Maps an archive file extension (case-insensitive) to its kind.
    /// Comic-book variants share the container format they wrap.
    pub fn from_archive_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "zip" | "cbz" => Some(CollectionKind::Zip),
            "7z" | "cb7" => Some(CollectionKind::SevenZip),
            "rar" | "cbr" => Some(CollectionKind::Rar),
            "tar" | "cbt" => Some(CollectionKind::Tar),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_archive_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Folder => "folder",
            CollectionKind::Zip => "zip",
            CollectionKind::SevenZip => "7z",
            CollectionKind::Rar => "rar",
            CollectionKind::Tar => "tar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(CollectionKind::Folder),
            "zip" => Some(CollectionKind::Zip),
            "7z" => Some(CollectionKind::SevenZip),
            "rar" => Some(CollectionKind::Rar),
            "tar" => Some(CollectionKind::Tar),
            _ => None,
        }
    }

    pub fn is_archive(&self) -> bool {
        !matches!(self, CollectionKind::Folder)
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory or archive that plausibly holds a collection of images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateCollection {
    pub name: String,
    pub path: PathBuf,
    pub kind: CollectionKind,
}

impl CandidateCollection {
    /// Builds a folder candidate named after the directory.
    pub fn folder(path: &Path) -> Self {
        Self {
            name: display_name(path, false),
            path: path.to_path_buf(),
            kind: CollectionKind::Folder,
        }
    }

    /// Builds an archive candidate named after the file without extension.
    pub fn archive(path: &Path, kind: CollectionKind) -> Self {
        Self {
            name: display_name(path, true),
            path: path.to_path_buf(),
            kind,
        }
    }
}

fn display_name(path: &Path, strip_extension: bool) -> String {
    let name = if strip_extension {
        path.file_stem()
    } else {
        path.file_name()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_extensions() {
        assert_eq!(
            CollectionKind::from_archive_extension("ZIP"),
            Some(CollectionKind::Zip)
        );
        assert_eq!(
            CollectionKind::from_archive_extension("cbr"),
            Some(CollectionKind::Rar)
        );
        assert_eq!(
            CollectionKind::from_archive_extension("7z"),
            Some(CollectionKind::SevenZip)
        );
        assert_eq!(CollectionKind::from_archive_extension("jpg"), None);
    }

    #[test]
    fn test_candidate_names() {
        let folder = CandidateCollection::folder(Path::new("/media/Trip 2024"));
        assert_eq!(folder.name, "Trip 2024");

        let archive =
            CandidateCollection::archive(Path::new("/media/volume.01.cbz"), CollectionKind::Zip);
        assert_eq!(archive.name, "volume.01");
        assert_eq!(archive.kind, CollectionKind::Zip);
    }

    #[test]
    fn test_kind_round_trips() {
        for kind in [
            CollectionKind::Folder,
            CollectionKind::Zip,
            CollectionKind::SevenZip,
            CollectionKind::Rar,
            CollectionKind::Tar,
        ] {
            assert_eq!(CollectionKind::parse(kind.as_str()), Some(kind));
        }
    }
}
