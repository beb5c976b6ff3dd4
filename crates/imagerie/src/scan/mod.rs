//! Candidate discovery inside folder trees and archive files.

pub mod archive;
pub mod candidate;
pub mod filters;
pub mod scanner;

pub use archive::{ArchiveReader, ZipArchiveReader};
pub use candidate::{CandidateCollection, CollectionKind};
pub use filters::ContentFilter;
pub use scanner::{CandidateScanner, Candidates};
