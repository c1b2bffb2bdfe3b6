use super::connector_message::{ConnectorMessage, MessageMap};
use super::response::Response;
use super::status::Status;
use crate::constants::SOURCE_METADATA_ID;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw inbound data submitted to a channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    pub raw_data: String,
    #[serde(default)]
    pub source_map: MessageMap,
    /// Restrict processing to these destinations; `None` means every destination
    #[serde(default)]
    pub destination_metadata_ids: Option<Vec<u32>>,
}

impl RawMessage {
    pub fn new(raw_data: impl Into<String>) -> Self {
        Self {
            raw_data: raw_data.into(),
            ..Default::default()
        }
    }

    pub fn with_source_map(mut self, source_map: MessageMap) -> Self {
        self.source_map = source_map;
        self
    }

    pub fn with_destinations(mut self, metadata_ids: Vec<u32>) -> Self {
        self.destination_metadata_ids = Some(metadata_ids);
        self
    }

    pub fn targets(&self, metadata_id: u32) -> bool {
        self.destination_metadata_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&metadata_id))
    }
}

/// A message with every connector message produced for it, keyed by metadata id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: u64,
    pub channel_id: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub connector_messages: BTreeMap<u32, ConnectorMessage>,
}

impl Message {
    pub fn new(source: ConnectorMessage) -> Self {
        let mut connector_messages = BTreeMap::new();
        let message_id = source.message_id;
        let channel_id = source.channel_id.clone();
        let received_at = source.received_at;
        connector_messages.insert(source.metadata_id, source);

        Self {
            message_id,
            channel_id,
            received_at,
            processed: false,
            connector_messages,
        }
    }

    pub fn source(&self) -> Option<&ConnectorMessage> {
        self.connector_messages.get(&SOURCE_METADATA_ID)
    }

    pub fn destination(&self, metadata_id: u32) -> Option<&ConnectorMessage> {
        self.connector_messages
            .get(&metadata_id)
            .filter(|m| m.metadata_id != SOURCE_METADATA_ID)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &ConnectorMessage> {
        self.connector_messages
            .values()
            .filter(|m| m.metadata_id != SOURCE_METADATA_ID)
    }

    pub fn add(&mut self, message: ConnectorMessage) {
        self.connector_messages.insert(message.metadata_id, message);
    }

    /// Merged response map across source and all destinations.
    ///
    /// Later destinations win on key collisions, matching chain order.
    pub fn merged_response_map(&self) -> MessageMap {
        let mut merged = MessageMap::new();
        for message in self.connector_messages.values() {
            for (key, value) in &message.response_map {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Nothing left for a queue consumer to do. An accepted source message
    /// rests at TRANSFORMED.
    pub fn is_complete(&self) -> bool {
        self.connector_messages.iter().all(|(metadata_id, m)| {
            m.status().is_completed()
                || (*metadata_id == SOURCE_METADATA_ID && m.status() == Status::Transformed)
        })
    }

    pub fn status_of(&self, metadata_id: u32) -> Option<Status> {
        self.connector_messages.get(&metadata_id).map(|m| m.status())
    }
}

/// Outcome of pushing one raw message through a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub channel_id: String,
    pub message_id: u64,
    /// Response chosen by the channel's response selector, if any
    pub selected_response: Option<Response>,
    /// Full processed message; `None` when the message was only queued at the source
    pub processed_message: Option<Message>,
    /// The source queue accepted the message for later processing
    pub queued: bool,
}

impl DispatchResult {
    pub fn status_of(&self, metadata_id: u32) -> Option<Status> {
        self.processed_message
            .as_ref()
            .and_then(|m| m.status_of(metadata_id))
    }
}
