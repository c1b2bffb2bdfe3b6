use crate::events::{ConnectionStatus, ConnectionStatusEvent, ErrorEvent, ErrorEventType, EventDispatcher};
use crate::message::ConnectorMessage;
use crate::statistics::StatisticsRegistry;
use crate::storage::{MessageStore, StorageSettings};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, warn};

/// Collaborators every connector of a channel reports to
#[derive(Debug, Clone)]
pub struct ChannelServices {
    pub channel_id: String,
    pub events: Arc<EventDispatcher>,
    pub store: Arc<dyn MessageStore>,
    pub statistics: Arc<StatisticsRegistry>,
    pub storage: StorageSettings,
}

impl ChannelServices {
    /// Persist a connector message and count its status.
    ///
    /// Storage failures are reported as events; they never fail the message.
    pub async fn record(&self, message: &ConnectorMessage) {
        let status = message.status();
        self.statistics
            .record(&self.channel_id, message.metadata_id, status);

        if let Err(e) = self.store.persist(message, &self.storage).await {
            warn!(
                channel_id = %self.channel_id,
                metadata_id = message.metadata_id,
                message_id = message.message_id,
                error = %e,
                "CHANNEL: Failed to persist message"
            );
            self.emit_error(
                ErrorEvent::new(ErrorEventType::Storage, "Failed to persist message")
                    .for_connector(message.metadata_id, &message.connector_name)
                    .with_cause(&e),
            );
        }

        if let Err(e) = self
            .store
            .update_statistics(&self.channel_id, message.metadata_id, status)
            .await
        {
            warn!(channel_id = %self.channel_id, error = %e, "CHANNEL: Failed to update statistics");
        }
    }

    /// Dispatch an error event scoped to this channel
    pub fn emit_error(&self, event: ErrorEvent) {
        let event = event.for_channel(&self.channel_id);
        error!(
            channel_id = %self.channel_id,
            metadata_id = ?event.metadata_id,
            event_type = %event.event_type,
            cause = ?event.cause,
            "{}",
            event.message
        );
        self.events.dispatch(event);
    }

    /// Convenience for connector-scoped failures
    pub fn emit_connector_error(
        &self,
        metadata_id: u32,
        connector_name: &str,
        event_type: ErrorEventType,
        message: impl Into<String>,
        cause: impl Display,
    ) {
        self.emit_error(
            ErrorEvent::new(event_type, message)
                .for_connector(metadata_id, connector_name)
                .with_cause(cause),
        );
    }

    pub fn emit_status(&self, metadata_id: u32, connector_name: &str, status: ConnectionStatus) {
        self.events.dispatch(ConnectionStatusEvent::new(
            &self.channel_id,
            metadata_id,
            connector_name,
            status,
        ));
    }
}
