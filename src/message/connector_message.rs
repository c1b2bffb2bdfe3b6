use super::response::Response;
use super::status::{InvalidStatusTransition, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Key/value context carried alongside a message
pub type MessageMap = HashMap<String, Value>;

/// One encoded payload stage of a connector message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub content: String,
    pub data_type: String,
}

impl MessageContent {
    pub fn new(content: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data_type: data_type.into(),
        }
    }
}

/// The unit flowing through a single connector's pipeline.
///
/// A connector message is owned by whichever task is processing it and is
/// moved, never shared, across queue boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorMessage {
    pub message_id: u64,
    pub channel_id: String,
    pub metadata_id: u32,
    pub connector_name: String,
    pub received_at: DateTime<Utc>,
    status: Status,

    pub raw: Option<MessageContent>,
    pub processed_raw: Option<MessageContent>,
    pub transformed: Option<MessageContent>,
    pub encoded: Option<MessageContent>,
    pub sent: Option<MessageContent>,
    pub response: Option<MessageContent>,
    pub response_transformed: Option<MessageContent>,
    pub processed_response: Option<MessageContent>,

    /// Source map is fixed at receive time and shared by every connector of the message
    pub source_map: Arc<MessageMap>,
    pub channel_map: MessageMap,
    pub response_map: MessageMap,

    pub processing_error: Option<String>,
    pub response_error: Option<String>,
    pub send_attempts: u32,
    pub send_date: Option<DateTime<Utc>>,
    pub response_date: Option<DateTime<Utc>>,
}

impl ConnectorMessage {
    /// Create a source connector message from raw inbound data
    pub fn new(
        message_id: u64,
        channel_id: impl Into<String>,
        metadata_id: u32,
        connector_name: impl Into<String>,
        raw: MessageContent,
        source_map: Arc<MessageMap>,
    ) -> Self {
        Self {
            message_id,
            channel_id: channel_id.into(),
            metadata_id,
            connector_name: connector_name.into(),
            received_at: Utc::now(),
            status: Status::Received,
            raw: Some(raw),
            processed_raw: None,
            transformed: None,
            encoded: None,
            sent: None,
            response: None,
            response_transformed: None,
            processed_response: None,
            source_map,
            channel_map: MessageMap::new(),
            response_map: MessageMap::new(),
            processing_error: None,
            response_error: None,
            send_attempts: 0,
            send_date: None,
            response_date: None,
        }
    }

    /// Derive the destination copy of an accepted source message.
    ///
    /// The destination's raw content is the source's encoded content; maps are
    /// copied so each destination owns its own view.
    pub fn for_destination(
        source: &ConnectorMessage,
        metadata_id: u32,
        connector_name: impl Into<String>,
    ) -> Self {
        let raw = source
            .encoded
            .clone()
            .or_else(|| source.raw.clone())
            .unwrap_or_else(|| MessageContent::new("", ""));

        let mut message = Self::new(
            source.message_id,
            source.channel_id.clone(),
            metadata_id,
            connector_name,
            raw,
            Arc::clone(&source.source_map),
        );
        message.channel_map = source.channel_map.clone();
        message.response_map = source.response_map.clone();
        message
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Advance the status, enforcing forward-only progression
    pub fn set_status(&mut self, next: Status) -> Result<(), InvalidStatusTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidStatusTransition {
                message_id: self.message_id,
                metadata_id: self.metadata_id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Content that the next stage should operate on
    pub fn raw_content(&self) -> &str {
        self.processed_raw
            .as_ref()
            .or(self.raw.as_ref())
            .map(|c| c.content.as_str())
            .unwrap_or_default()
    }

    /// Encoded content, falling back to raw when the pipeline never ran
    pub fn encoded_content(&self) -> &str {
        self.encoded
            .as_ref()
            .map(|c| c.content.as_str())
            .unwrap_or_else(|| self.raw_content())
    }

    /// Mark the message as failed with an error description
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidStatusTransition> {
        self.processing_error = Some(error.into());
        self.set_status(Status::Error)
    }

    /// Record the transport response on the message
    pub fn record_response(&mut self, response: &Response, data_type: &str) {
        self.response = Some(MessageContent::new(response.data.clone(), data_type));
        self.response_date = Some(Utc::now());
        if !response.error.is_empty() {
            self.response_error = Some(response.error.clone());
        }
    }
}
