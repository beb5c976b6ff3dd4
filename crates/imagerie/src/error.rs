use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;

/// Coarse classification used by callers to decide between skipping,
/// rejecting and retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Job, stage or collection is missing. Never retried internally.
    NotFound,
    /// Malformed input, rejected before any side effect.
    Validation,
    /// Archive or filesystem access failed; the candidate is skipped.
    TransientIo,
    /// A counter increment could not be applied; reconciled by the next sweep.
    AtomicUpdateFailure,
    /// The document store itself failed.
    Storage,
}

#[derive(Error, Debug)]
pub enum ImagerieError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ImagerieError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImagerieError::Config(_) => ErrorKind::Validation,
            ImagerieError::Scan(e) => e.kind(),
            ImagerieError::Job(e) => e.kind(),
            ImagerieError::Ingest(e) => e.kind(),
            ImagerieError::Database(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scan root does not exist: {0}")]
    ParentNotFound(PathBuf),

    #[error("Scan root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Directory walk failed under '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to list directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::ParentNotFound(_) => ErrorKind::NotFound,
            ScanError::NotADirectory(_) => ErrorKind::Validation,
            ScanError::Walk { .. } | ScanError::ReadDir { .. } | ScanError::Archive(_) => {
                ErrorKind::TransientIo
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read archive '{path}': {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("No reader available for {kind} archive '{path}'")]
    Unsupported { path: PathBuf, kind: String },
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("Stage '{stage}' not found on job {job_id}")]
    StageNotFound { job_id: String, stage: String },

    #[error("Stage '{stage}' already sealed with total {sealed}, refusing total {requested}")]
    StageAlreadySealed {
        stage: String,
        sealed: u64,
        requested: u64,
    },

    #[error("Job {job_id} is already {status}")]
    Terminal { job_id: String, status: String },

    #[error("Job {job_id} was modified concurrently")]
    VersionConflict { job_id: String },

    #[error("Invalid job request: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::NotFound { .. } | JobError::StageNotFound { .. } => ErrorKind::NotFound,
            JobError::StageAlreadySealed { .. }
            | JobError::Terminal { .. }
            | JobError::Validation(_) => ErrorKind::Validation,
            JobError::VersionConflict { .. } => ErrorKind::AtomicUpdateFailure,
            JobError::Database(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Work channel closed")]
    ChannelClosed,

    #[error("Broker rejected message: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid ingest request: {0}")]
    Validation(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Validation(_) => ErrorKind::Validation,
            IngestError::Scan(e) => e.kind(),
            IngestError::Job(e) => e.kind(),
            IngestError::Dispatch(_) => ErrorKind::TransientIo,
            IngestError::Database(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImagerieError>;
