//! # Engine Errors
//!
//! Top-level error taxonomy for the channel engine. Subsystems keep their own
//! error enums and convert into [`EngineError`] at the controller boundary.

use crate::alert::AlertError;
use crate::config::ConfigurationError;
use crate::connector::TransportError;
use crate::events::ErrorEventType;
use crate::message::InvalidStatusTransition;
use crate::pipeline::PipelineError;
use crate::state_machine::{ConnectorState, StateMachineError};
use crate::storage::StoreError;
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to deploy channel {channel_id}: {reason}")]
    Deploy { channel_id: String, reason: String },

    #[error("Failed to undeploy channel {channel_id}: {reason}")]
    Undeploy { channel_id: String, reason: String },

    #[error("Failed to start {target}: {reason}")]
    Start { target: String, reason: String },

    #[error("Failed to stop {target}: {reason}")]
    Stop { target: String, reason: String },

    #[error("Failed to halt {target}: {reason}")]
    Halt { target: String, reason: String },

    #[error("Failed to pause {target}: {reason}")]
    Pause { target: String, reason: String },

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("Connector {metadata_id} not found on channel {channel_id}")]
    ConnectorNotFound { channel_id: String, metadata_id: u32 },

    #[error("Channel {channel_id} is not accepting messages (state: {state})")]
    ChannelNotStarted {
        channel_id: String,
        state: ConnectorState,
    },

    #[error("{operation} was interrupted")]
    Interrupted { operation: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatusTransition),
}

impl EngineError {
    pub fn deploy(channel_id: impl Into<String>, reason: impl Display) -> Self {
        Self::Deploy {
            channel_id: channel_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn undeploy(channel_id: impl Into<String>, reason: impl Display) -> Self {
        Self::Undeploy {
            channel_id: channel_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn start(target: impl Into<String>, reason: impl Display) -> Self {
        Self::Start {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn stop(target: impl Into<String>, reason: impl Display) -> Self {
        Self::Stop {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn halt(target: impl Into<String>, reason: impl Display) -> Self {
        Self::Halt {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn pause(target: impl Into<String>, reason: impl Display) -> Self {
        Self::Pause {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn channel_not_found(channel_id: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel_id: channel_id.into(),
        }
    }

    /// Interruptions leave the deployed set in an unknown shape and must not be swallowed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Error event category used when this error is reported at a controller boundary
    pub fn error_event_type(&self) -> ErrorEventType {
        match self {
            Self::Deploy { .. } | Self::Configuration(_) => ErrorEventType::Deploy,
            Self::Undeploy { .. } => ErrorEventType::Undeploy,
            Self::Start { .. } => ErrorEventType::Start,
            Self::Stop { .. } => ErrorEventType::Stop,
            Self::Halt { .. } => ErrorEventType::Halt,
            Self::Pause { .. } => ErrorEventType::Pause,
            Self::Pipeline(e) => e.error_event_type(),
            Self::Transport(_) => ErrorEventType::DestinationConnector,
            Self::Storage(_) => ErrorEventType::Storage,
            Self::Alert(_) => ErrorEventType::Alert,
            Self::ChannelNotFound { .. }
            | Self::ConnectorNotFound { .. }
            | Self::ChannelNotStarted { .. }
            | Self::Interrupted { .. }
            | Self::StateMachine(_)
            | Self::InvalidStatus(_) => ErrorEventType::Any,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_messages() {
        let err = EngineError::deploy("abc", "unknown connector type 'tcp'");
        assert_eq!(
            err.to_string(),
            "Failed to deploy channel abc: unknown connector type 'tcp'"
        );
        assert_eq!(err.error_event_type(), ErrorEventType::Deploy);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_interrupted_is_fatal() {
        let err = EngineError::Interrupted {
            operation: "redeploy".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "redeploy was interrupted");
    }
}
