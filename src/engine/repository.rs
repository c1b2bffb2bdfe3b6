//! Source of channel definitions consumed at deploy time.

use crate::config::{ChannelConfig, ConfigResult, ConfigurationError};
use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait ChannelRepository: Send + Sync + std::fmt::Debug {
    async fn get(&self, channel_id: &str) -> ConfigResult<ChannelConfig>;

    async fn list(&self) -> ConfigResult<Vec<ChannelConfig>>;

    /// Current revision of a stored definition, if it exists
    async fn revision(&self, channel_id: &str) -> Option<u32> {
        self.get(channel_id).await.ok().map(|c| c.revision)
    }
}

/// Channel definitions held in memory, keyed by id
#[derive(Debug, Default)]
pub struct InMemoryChannelRepository {
    channels: DashMap<String, ChannelConfig>,
}

impl InMemoryChannelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: impl IntoIterator<Item = ChannelConfig>) -> Self {
        let repository = Self::new();
        for channel in channels {
            repository.save(channel);
        }
        repository
    }

    /// Insert or replace a definition, returning the previous one
    pub fn save(&self, channel: ChannelConfig) -> Option<ChannelConfig> {
        self.channels.insert(channel.id.clone(), channel)
    }

    pub fn remove(&self, channel_id: &str) -> Option<ChannelConfig> {
        self.channels.remove(channel_id).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn get(&self, channel_id: &str) -> ConfigResult<ChannelConfig> {
        self.channels
            .get(channel_id)
            .map(|c| c.clone())
            .ok_or_else(|| ConfigurationError::ChannelDefinitionNotFound {
                channel_id: channel_id.to_string(),
            })
    }

    async fn list(&self) -> ConfigResult<Vec<ChannelConfig>> {
        let mut channels: Vec<ChannelConfig> =
            self.channels.iter().map(|c| c.value().clone()).collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;

    #[tokio::test]
    async fn test_save_get_and_revision() {
        let repository = InMemoryChannelRepository::new();
        let mut channel = ChannelConfig::new("adt", "ADT Inbound", ConnectorConfig::new("Source", "push"));
        channel.revision = 4;
        repository.save(channel);

        assert_eq!(repository.get("adt").await.unwrap().name, "ADT Inbound");
        assert_eq!(repository.revision("adt").await, Some(4));
        assert!(matches!(
            repository.get("lab").await,
            Err(ConfigurationError::ChannelDefinitionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let repository = InMemoryChannelRepository::with_channels([
            ChannelConfig::new("b", "B", ConnectorConfig::new("Source", "push")),
            ChannelConfig::new("a", "A", ConnectorConfig::new("Source", "push")),
        ]);
        let ids: Vec<String> = repository.list().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
