use super::settings::StorageSettings;
use crate::message::{ConnectorMessage, Status};
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to persist message {message_id} for connector {metadata_id}: {reason}")]
    Persist {
        message_id: u64,
        metadata_id: u32,
        reason: String,
    },
    #[error("Failed to update statistics for channel {channel_id}: {reason}")]
    Statistics { channel_id: String, reason: String },
    #[error("Message store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam. The engine calls it opaquely and never inspects the format.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persist a connector message snapshot according to the channel's settings
    async fn persist(
        &self,
        message: &ConnectorMessage,
        settings: &StorageSettings,
    ) -> Result<(), StoreError>;

    /// Record a status change for statistics bookkeeping
    async fn update_statistics(
        &self,
        channel_id: &str,
        metadata_id: u32,
        status: Status,
    ) -> Result<(), StoreError>;

    /// Drop stored content for a completed message
    async fn remove_content(&self, channel_id: &str, message_id: u64) -> Result<(), StoreError>;
}

/// In-memory store keyed by (channel, message, connector)
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<(String, u64, u32), ConnectorMessage>,
    status_updates: DashMap<(String, u32), u64>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: &str, message_id: u64, metadata_id: u32) -> Option<ConnectorMessage> {
        self.messages
            .get(&(channel_id.to_string(), message_id, metadata_id))
            .map(|entry| entry.value().clone())
    }

    pub fn message_count(&self, channel_id: &str) -> usize {
        self.messages
            .iter()
            .filter(|entry| entry.key().0 == channel_id)
            .count()
    }

    pub fn status_update_count(&self, channel_id: &str, metadata_id: u32) -> u64 {
        self.status_updates
            .get(&(channel_id.to_string(), metadata_id))
            .map(|v| *v)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn persist(
        &self,
        message: &ConnectorMessage,
        settings: &StorageSettings,
    ) -> Result<(), StoreError> {
        if !settings.enabled {
            return Ok(());
        }
        let key = (
            message.channel_id.clone(),
            message.message_id,
            message.metadata_id,
        );
        self.messages.insert(key, settings.project(message));
        Ok(())
    }

    async fn update_statistics(
        &self,
        channel_id: &str,
        metadata_id: u32,
        _status: Status,
    ) -> Result<(), StoreError> {
        *self
            .status_updates
            .entry((channel_id.to_string(), metadata_id))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn remove_content(&self, channel_id: &str, message_id: u64) -> Result<(), StoreError> {
        for mut entry in self.messages.iter_mut() {
            let (channel, id, _) = entry.key();
            if channel == channel_id && *id == message_id {
                let message = entry.value_mut();
                message.raw = None;
                message.processed_raw = None;
                message.transformed = None;
                message.encoded = None;
                message.sent = None;
                message.response = None;
                message.response_transformed = None;
                message.processed_response = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageContent;
    use crate::storage::{MessageStorageMode, StorageOverrides};
    use std::sync::Arc;

    fn message() -> ConnectorMessage {
        ConnectorMessage::new(
            3,
            "channel-a",
            0,
            "Source",
            MessageContent::new("payload", "RAW"),
            Arc::default(),
        )
    }

    #[tokio::test]
    async fn test_disabled_storage_persists_nothing() {
        let store = MemoryMessageStore::new();
        let settings =
            StorageSettings::from_mode(MessageStorageMode::Disabled, StorageOverrides::default());
        store.persist(&message(), &settings).await.unwrap();
        assert_eq!(store.message_count("channel-a"), 0);
    }

    #[tokio::test]
    async fn test_remove_content_keeps_metadata() {
        let store = MemoryMessageStore::new();
        store
            .persist(&message(), &StorageSettings::default())
            .await
            .unwrap();
        store.remove_content("channel-a", 3).await.unwrap();

        let stored = store.get("channel-a", 3, 0).unwrap();
        assert!(stored.raw.is_none());
        assert_eq!(stored.message_id, 3);
    }
}
