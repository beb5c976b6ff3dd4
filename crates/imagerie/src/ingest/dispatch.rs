//! Outbound work dispatch.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::debug;

use super::message::WorkMessage;
use crate::error::DispatchError;

/// Hands a work message to whatever executes it (a broker, a worker pool).
pub trait WorkPublisher: Send + Sync {
    fn publish(&self, message: WorkMessage) -> Result<(), DispatchError>;
}

/// Publishes onto a crossbeam channel for an in-process worker pool.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: Sender<WorkMessage>,
}

impl ChannelPublisher {
    /// Creates a bounded channel. Publishing fails instead of blocking when
    /// the channel is full.
    pub fn bounded(capacity: usize) -> (Self, Receiver<WorkMessage>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    pub fn unbounded() -> (Self, Receiver<WorkMessage>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: Sender<WorkMessage>) -> Self {
        Self { sender }
    }
}

impl WorkPublisher for ChannelPublisher {
    fn publish(&self, message: WorkMessage) -> Result<(), DispatchError> {
        debug!("Publishing {} work for job {}", message.stage(), message.job_id());
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::Rejected("work channel is full".to_string()),
            TrySendError::Disconnected(_) => DispatchError::ChannelClosed,
        })
    }
}
