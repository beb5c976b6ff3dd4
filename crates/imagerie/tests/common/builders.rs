//! Fixture builders for media trees and collection documents.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use imagerie::collection::{ArtifactRef, Collection, ImageEntry};
use imagerie::scan::CandidateCollection;
use zip::write::SimpleFileOptions;

/// Creates `dir/name` holding the given files.
pub fn write_folder(dir: &Path, name: &str, files: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(&path).expect("Failed to create folder fixture");
    for file in files {
        fs::write(path.join(file), b"image bytes").expect("Failed to write folder fixture");
    }
    path
}

/// Writes a zip archive with the given entry names.
pub fn write_zip(dir: &Path, name: &str, entries: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).expect("Failed to create zip fixture");
    let mut writer = zip::ZipWriter::new(file);
    for entry in entries {
        writer
            .start_file(*entry, SimpleFileOptions::default())
            .expect("Failed to start zip entry");
        writer.write_all(b"image bytes").expect("Failed to write zip entry");
    }
    writer.finish().expect("Failed to finish zip fixture");
    path
}

/// Writes a file with an archive extension that is not a valid archive.
pub fn write_corrupt_archive(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"PK\x03\x04 truncated").expect("Failed to write corrupt archive");
    path
}

/// Builds a collection document for `path` with `items` active images, the
/// first `thumbnails` of which have thumbnails and the first `cache` of
/// which have cache images.
pub struct CollectionBuilder {
    path: PathBuf,
    items: usize,
    thumbnails: usize,
    cache: usize,
}

impl CollectionBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            items: 0,
            thumbnails: 0,
            cache: 0,
        }
    }

    pub fn items(mut self, n: usize) -> Self {
        self.items = n;
        self
    }

    pub fn thumbnails(mut self, n: usize) -> Self {
        self.thumbnails = n;
        self
    }

    pub fn cache(mut self, n: usize) -> Self {
        self.cache = n;
        self
    }

    pub fn build(self) -> Collection {
        let candidate = CandidateCollection::folder(&self.path);
        let mut collection = Collection::from_candidate(&candidate);
        for i in 0..self.items {
            collection
                .images
                .push(ImageEntry::new(item_id(i), format!("{:03}.jpg", i)));
        }
        for i in 0..self.thumbnails {
            collection.thumbnails.push(ArtifactRef::new(item_id(i)));
        }
        for i in 0..self.cache {
            collection.cache_images.push(ArtifactRef::new(item_id(i)));
        }
        collection
    }
}

pub fn item_id(i: usize) -> String {
    format!("item-{:03}", i)
}
