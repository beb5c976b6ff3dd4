//! Bulk ingestion orchestration and outbound work dispatch.

pub mod bulk;
pub mod dispatch;
pub mod message;

pub use bulk::{BulkIngestRequest, BulkIngestResult, BulkIngestor, CandidateOutcome, OutcomeStatus};
pub use dispatch::{ChannelPublisher, WorkPublisher};
pub use message::WorkMessage;
