pub mod broadcast;
pub mod collection;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod plan;
pub mod scan;
pub mod telemetry;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent, ProgressEventKind};
pub use collection::{ArtifactRef, Collection, CollectionId, ImageEntry};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use db::{
    CollectionRepository, Database, DatabaseError, JobRepository, SqliteCollectionRepository,
    SqliteJobRepository,
};
pub use engine::Engine;
pub use error::{
    ArchiveError, ConfigError, DispatchError, ErrorKind, ImagerieError, IngestError, JobError,
    Result, ScanError,
};
pub use ingest::{
    BulkIngestRequest, BulkIngestResult, BulkIngestor, CandidateOutcome, ChannelPublisher,
    OutcomeStatus, WorkMessage, WorkPublisher,
};
pub use jobs::{
    JobHealth, JobRecord, JobStatus, JobTracker, ReconcileScheduler, StageCounter, StageStatus,
    SweepReport,
};
pub use plan::{compute_gaps, plan_resume, GapReport, PlanFlags, ResumeDecision};
pub use scan::{ArchiveReader, CandidateCollection, CandidateScanner, CollectionKind};
pub use telemetry::{init_logging, LogFormat};
