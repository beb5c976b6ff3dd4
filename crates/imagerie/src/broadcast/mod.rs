//! Broadcasting of job progress events to in-process subscribers.

pub mod job_progress;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, ProgressEventKind};
