//! Wiring of the engine's parts from an [`EngineConfig`].

use std::sync::Arc;

use log::info;
use tokio::sync::broadcast;

use crate::broadcast::JobProgressBroadcaster;
use crate::config::EngineConfig;
use crate::db::{Database, DatabaseError, SqliteCollectionRepository, SqliteJobRepository};
use crate::error::Result;
use crate::ingest::{BulkIngestor, WorkPublisher};
use crate::jobs::{HealthThresholds, JobTracker, ReconcileScheduler};
use crate::scan::{ArchiveReader, CandidateScanner, ZipArchiveReader};

/// The assembled engine: one database, one tracker shared by the bulk
/// ingestor and the sweep scheduler.
pub struct Engine {
    database: Database,
    tracker: Arc<JobTracker>,
    ingestor: BulkIngestor,
    scheduler: ReconcileScheduler,
    progress: JobProgressBroadcaster,
    sweep_trigger: broadcast::Sender<()>,
}

impl Engine {
    /// Opens the configured database and assembles the engine with the
    /// default zip reader.
    pub fn open(config: &EngineConfig, publisher: Arc<dyn WorkPublisher>) -> Result<Self> {
        let path = config
            .database
            .resolved_path()
            .ok_or(DatabaseError::NoDefaultPath)?;
        let database = Database::open(&path)?;
        Ok(Self::with_database(
            config,
            database,
            publisher,
            Arc::new(ZipArchiveReader),
        ))
    }

    pub fn with_database(
        config: &EngineConfig,
        database: Database,
        publisher: Arc<dyn WorkPublisher>,
        reader: Arc<dyn ArchiveReader>,
    ) -> Self {
        let progress = JobProgressBroadcaster::default();
        let tracker = Arc::new(
            JobTracker::new(
                Arc::new(SqliteJobRepository::new(database.clone())),
                HealthThresholds::from_config(&config.jobs),
            )
            .with_broadcaster(progress.clone()),
        );
        let ingestor = BulkIngestor::new(
            CandidateScanner::new(&config.scan, reader),
            Arc::new(SqliteCollectionRepository::new(database.clone())),
            Arc::clone(&tracker),
            publisher,
        );
        let scheduler = ReconcileScheduler::new(Arc::clone(&tracker), config.jobs.sweep_interval());
        let (sweep_trigger, _) = broadcast::channel(16);

        Self {
            database,
            tracker,
            ingestor,
            scheduler,
            progress,
            sweep_trigger,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub fn ingestor(&self) -> &BulkIngestor {
        &self.ingestor
    }

    pub fn progress(&self) -> &JobProgressBroadcaster {
        &self.progress
    }

    /// Starts the background sweep. Call [`Engine::stop_sweeps`] to end it.
    pub fn start_sweeps(&self) -> std::thread::JoinHandle<()> {
        info!("Starting reconcile sweeps");
        self.scheduler.start(self.sweep_trigger.subscribe())
    }

    /// Requests an immediate sweep from a running scheduler.
    pub fn trigger_sweep(&self) {
        let _ = self.sweep_trigger.send(());
    }

    pub fn stop_sweeps(&self) {
        self.scheduler.stop();
        self.trigger_sweep();
    }

    pub fn scheduler(&self) -> &ReconcileScheduler {
        &self.scheduler
    }
}
