//! Transport plugin contract.
//!
//! Wire transports (TCP, HTTP, file, database) live outside the engine and
//! plug in through these traits.

use crate::message::{ConnectorMessage, RawMessage, Response};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a source or destination transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Whether a queued destination should try the send again
    pub retryable: bool,
}

impl TransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Lifecycle hooks shared by every transport.
///
/// `on_start` is never called on an instance whose `on_deploy` failed, and
/// `on_halt` may be called in any state, including after `on_stop`.
#[async_trait]
pub trait ConnectorLifecycle: Send + Sync {
    async fn on_deploy(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn on_undeploy(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn on_start(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn on_stop(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn on_halt(&self) -> TransportResult<()> {
        Ok(())
    }
}

/// Inbound side of a channel.
///
/// Polling transports return an interval and implement `poll`; push
/// transports call back into the engine's dispatch entry point instead.
#[async_trait]
pub trait SourceTransport: ConnectorLifecycle {
    fn polling_interval(&self) -> Option<Duration> {
        None
    }

    async fn poll(&self) -> TransportResult<Vec<RawMessage>> {
        Ok(Vec::new())
    }
}

/// Outbound side of a destination connector
#[async_trait]
pub trait DestinationTransport: ConnectorLifecycle {
    async fn send(&self, properties: &Value, message: &ConnectorMessage)
        -> TransportResult<Response>;
}
