use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Processing status of a connector message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Received,
    Filtered,
    Transformed,
    Sent,
    Queued,
    Error,
    Pending,
}

impl Status {
    /// Terminal statuses end processing for a connector
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Filtered | Self::Sent | Self::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Transformed => 1,
            Self::Pending | Self::Queued => 2,
            Self::Filtered | Self::Sent | Self::Error => 3,
        }
    }

    /// Status only advances forward, except for an explicit retry/requeue
    /// back to `Pending` or `Queued`. Filtered messages are never requeued.
    pub fn can_transition_to(&self, next: Status) -> bool {
        if matches!(next, Self::Pending | Self::Queued) {
            return *self != Self::Filtered;
        }
        if self.is_completed() {
            return false;
        }
        next.rank() > self.rank()
    }

    /// Single-character code used in compact status listings
    pub fn code(&self) -> char {
        match self {
            Self::Received => 'R',
            Self::Filtered => 'F',
            Self::Transformed => 'T',
            Self::Sent => 'S',
            Self::Queued => 'Q',
            Self::Error => 'E',
            Self::Pending => 'P',
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Filtered => "FILTERED",
            Self::Transformed => "TRANSFORMED",
            Self::Sent => "SENT",
            Self::Queued => "QUEUED",
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status transition for message {message_id} on connector {metadata_id}: {from} -> {to}")]
pub struct InvalidStatusTransition {
    pub message_id: u64,
    pub metadata_id: u32,
    pub from: Status,
    pub to: Status,
}
