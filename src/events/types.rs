use crate::state_machine::{ConnectorActivity, ConnectorState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Category of an error event; alert triggers select on these
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorEventType {
    Any,
    SourceConnector,
    DestinationConnector,
    Serializer,
    Filter,
    Transformer,
    ResponseTransformer,
    Deploy,
    Undeploy,
    Start,
    Stop,
    Pause,
    Halt,
    Dispatch,
    Storage,
    Alert,
}

impl fmt::Display for ErrorEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "Any",
            Self::SourceConnector => "Source Connector",
            Self::DestinationConnector => "Destination Connector",
            Self::Serializer => "Serializer",
            Self::Filter => "Filter",
            Self::Transformer => "Transformer",
            Self::ResponseTransformer => "Response Transformer",
            Self::Deploy => "Deploy",
            Self::Undeploy => "Undeploy",
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Pause => "Pause",
            Self::Halt => "Halt",
            Self::Dispatch => "Dispatch",
            Self::Storage => "Storage",
            Self::Alert => "Alert",
        };
        f.write_str(name)
    }
}

/// Immutable record of one failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: Uuid,
    pub channel_id: Option<String>,
    pub metadata_id: Option<u32>,
    pub connector_name: Option<String>,
    pub event_type: ErrorEventType,
    pub message: String,
    pub cause: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn new(event_type: ErrorEventType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id: None,
            metadata_id: None,
            connector_name: None,
            event_type,
            message: message.into(),
            cause: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn for_connector(mut self, metadata_id: u32, connector_name: impl Into<String>) -> Self {
        self.metadata_id = Some(metadata_id);
        self.connector_name = Some(connector_name.into());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Human readable rendering used directly as an audit or alert payload
    pub fn formatted_message(&self) -> String {
        let mut out = format!("[{}] {}", self.event_type, self.message);
        if let Some(channel_id) = &self.channel_id {
            out.push_str(&format!("\nChannel: {channel_id}"));
        }
        if let Some(name) = &self.connector_name {
            let id = self.metadata_id.unwrap_or_default();
            out.push_str(&format!("\nConnector: {name} (metadata id {id})"));
        }
        if let Some(cause) = &self.cause {
            out.push_str(&format!("\nCause: {cause}"));
        }
        out
    }
}

/// What changed on a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Activity(ConnectorActivity),
    State(ConnectorState),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activity(activity) => write!(f, "{activity}"),
            Self::State(state) => write!(f, "{state}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatusEvent {
    pub channel_id: String,
    pub metadata_id: u32,
    pub connector_name: String,
    pub status: ConnectionStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConnectionStatusEvent {
    pub fn new(
        channel_id: impl Into<String>,
        metadata_id: u32,
        connector_name: impl Into<String>,
        status: ConnectionStatus,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            metadata_id,
            connector_name: connector_name.into(),
            status,
            message: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLevel {
    Information,
    Warning,
    Error,
}

/// Engine-wide informational event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvent {
    pub name: String,
    pub level: EventLevel,
    pub attributes: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ServerEvent {
    pub fn new(name: impl Into<String>, level: EventLevel) -> Self {
        Self {
            name: name.into(),
            level,
            attributes: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ConnectionStatus(ConnectionStatusEvent),
    Error(ErrorEvent),
    Server(ServerEvent),
}

impl Event {
    pub fn as_error(&self) -> Option<&ErrorEvent> {
        match self {
            Self::Error(event) => Some(event),
            _ => None,
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::ConnectionStatus(event) => Some(event.channel_id.as_str()),
            Self::Error(event) => event.channel_id.as_deref(),
            Self::Server(_) => None,
        }
    }
}

impl From<ErrorEvent> for Event {
    fn from(event: ErrorEvent) -> Self {
        Self::Error(event)
    }
}

impl From<ConnectionStatusEvent> for Event {
    fn from(event: ConnectionStatusEvent) -> Self {
        Self::ConnectionStatus(event)
    }
}

impl From<ServerEvent> for Event {
    fn from(event: ServerEvent) -> Self {
        Self::Server(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_message_includes_context() {
        let event = ErrorEvent::new(ErrorEventType::Filter, "Filter script failed")
            .for_channel("adt-inbound")
            .for_connector(2, "Lab Feed")
            .with_cause("ReferenceError: msg is not defined");

        let formatted = event.formatted_message();
        assert!(formatted.starts_with("[Filter] Filter script failed"));
        assert!(formatted.contains("Channel: adt-inbound"));
        assert!(formatted.contains("Connector: Lab Feed (metadata id 2)"));
        assert!(formatted.contains("Cause: ReferenceError"));
    }

    #[test]
    fn test_event_channel_lookup() {
        let event: Event = ConnectionStatusEvent::new(
            "a",
            0,
            "Source",
            ConnectionStatus::Activity(ConnectorActivity::Polling),
        )
        .into();
        assert_eq!(event.channel_id(), Some("a"));
        assert!(event.as_error().is_none());
    }
}
