//! Job progress engine: records, counters, reconciliation and health.

pub mod counter;
pub mod health;
pub mod reconcile;
pub mod record;
pub mod status;
pub mod sweep;
pub mod tracker;

pub use counter::StageCounter;
pub use health::{assess, HealthThresholds, JobHealth};
pub use reconcile::{
    derive_job_status, derive_stage_status, reconcile, ReconcileOutcome, StageTransition,
};
pub use record::{
    JobRecord, StageState, JOB_TYPE_COLLECTION_SCAN, JOB_TYPE_RESUME_COLLECTION, STAGE_CACHE,
    STAGE_SCAN, STAGE_THUMBNAIL,
};
pub use status::{JobStatus, StageStatus};
pub use sweep::ReconcileScheduler;
pub use tracker::{JobTracker, SweepReport};
