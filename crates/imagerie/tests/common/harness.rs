//! Test harness for isolated ingestion runs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use imagerie::config::ScanConfig;
use imagerie::db::{
    CollectionRepository, Database, SqliteCollectionRepository, SqliteJobRepository,
};
use imagerie::error::DispatchError;
use imagerie::ingest::{BulkIngestRequest, BulkIngestResult, BulkIngestor, WorkMessage, WorkPublisher};
use imagerie::jobs::{HealthThresholds, JobTracker};
use imagerie::scan::{CandidateScanner, ZipArchiveReader};
use imagerie::collection::Collection;

/// Captures every published message instead of sending it anywhere.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<WorkMessage>>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<WorkMessage> {
        self.messages.lock().expect("publisher lock poisoned").clone()
    }

    pub fn scan_count(&self) -> usize {
        self.messages().iter().filter(|m| m.is_scan()).count()
    }

    pub fn item_count(&self) -> usize {
        self.messages().iter().filter(|m| !m.is_scan()).count()
    }

    pub fn clear(&self) {
        self.messages.lock().expect("publisher lock poisoned").clear();
    }
}

impl WorkPublisher for RecordingPublisher {
    fn publish(&self, message: WorkMessage) -> Result<(), DispatchError> {
        self.messages
            .lock()
            .expect("publisher lock poisoned")
            .push(message);
        Ok(())
    }
}

/// Isolated environment: a temp media directory, a file-backed database,
/// and a bulk ingestor publishing into a [`RecordingPublisher`].
pub struct TestHarness {
    temp_dir: TempDir,
    pub media_dir: PathBuf,
    pub db_path: PathBuf,
    pub database: Database,
    pub collections: Arc<SqliteCollectionRepository>,
    pub tracker: Arc<JobTracker>,
    pub publisher: Arc<RecordingPublisher>,
    pub ingestor: BulkIngestor,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let media_dir = temp_dir.path().join("media");
        std::fs::create_dir_all(&media_dir).expect("Failed to create media dir");
        let db_path = temp_dir.path().join("db").join("imagerie.db");

        let database = Database::open(&db_path).expect("Failed to open test database");
        let collections = Arc::new(SqliteCollectionRepository::new(database.clone()));
        let tracker = Arc::new(JobTracker::new(
            Arc::new(SqliteJobRepository::new(database.clone())),
            HealthThresholds::default(),
        ));
        let publisher = Arc::new(RecordingPublisher::default());
        let scanner = CandidateScanner::new(&ScanConfig::default(), Arc::new(ZipArchiveReader));
        let ingestor = BulkIngestor::new(
            scanner,
            collections.clone(),
            Arc::clone(&tracker),
            publisher.clone(),
        );

        Self {
            temp_dir,
            media_dir,
            db_path,
            database,
            collections,
            tracker,
            publisher,
            ingestor,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens a second, independent connection to the same database file,
    /// as another process would.
    pub fn second_connection(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to open second connection")
    }

    pub fn insert_collection(&self, collection: &Collection) {
        self.collections
            .insert(collection)
            .expect("Failed to insert collection");
    }

    pub fn ingest(&self, request: BulkIngestRequest) -> BulkIngestResult {
        self.ingestor.ingest(&request).expect("Bulk ingest failed")
    }

    pub fn request(&self) -> BulkIngestRequest {
        BulkIngestRequest::new(&self.media_dir)
    }
}
