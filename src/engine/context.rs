//! # Engine Context
//!
//! Every collaborator the engine needs, constructed once at startup and shared
//! by reference. Nothing in the engine reaches for process-wide state.

use super::global_map::GlobalMap;
use super::repository::{ChannelRepository, InMemoryChannelRepository};
use crate::config::EngineConfig;
use crate::connector::ConnectorRegistry;
use crate::events::EventDispatcher;
use crate::pipeline::{DataTypeRegistry, PassthroughEvaluator, ScriptEvaluator};
use crate::statistics::StatisticsRegistry;
use crate::storage::{MemoryMessageStore, MessageStore};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct EngineContext {
    pub config: EngineConfig,
    pub connectors: Arc<ConnectorRegistry>,
    pub data_types: Arc<DataTypeRegistry>,
    pub evaluator: Arc<dyn ScriptEvaluator>,
    pub events: Arc<EventDispatcher>,
    pub store: Arc<dyn MessageStore>,
    pub statistics: Arc<StatisticsRegistry>,
    pub repository: Arc<dyn ChannelRepository>,
    pub global_map: Arc<GlobalMap>,
    global_channel_maps: DashMap<String, Arc<GlobalMap>>,
}

impl EngineContext {
    pub fn builder(config: EngineConfig) -> EngineContextBuilder {
        EngineContextBuilder::new(config)
    }

    /// Per-channel variable store; survives redeploys of the same channel id
    pub fn global_channel_map(&self, channel_id: &str) -> Arc<GlobalMap> {
        Arc::clone(
            self.global_channel_maps
                .entry(channel_id.to_string())
                .or_default()
                .value(),
        )
    }
}

/// Builder for [`EngineContext`]; unset collaborators get in-memory defaults
#[derive(Debug)]
pub struct EngineContextBuilder {
    config: EngineConfig,
    connectors: Option<Arc<ConnectorRegistry>>,
    data_types: Option<Arc<DataTypeRegistry>>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    events: Option<Arc<EventDispatcher>>,
    store: Option<Arc<dyn MessageStore>>,
    repository: Option<Arc<dyn ChannelRepository>>,
}

impl EngineContextBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            connectors: None,
            data_types: None,
            evaluator: None,
            events: None,
            store: None,
            repository: None,
        }
    }

    pub fn with_connectors(mut self, connectors: Arc<ConnectorRegistry>) -> Self {
        self.connectors = Some(connectors);
        self
    }

    pub fn with_data_types(mut self, data_types: Arc<DataTypeRegistry>) -> Self {
        self.data_types = Some(data_types);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn ChannelRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn build(self) -> EngineContext {
        let capacity = self.config.event_channel_capacity;
        EngineContext {
            connectors: self.connectors.unwrap_or_default(),
            data_types: self.data_types.unwrap_or_default(),
            evaluator: self
                .evaluator
                .unwrap_or_else(|| Arc::new(PassthroughEvaluator)),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(EventDispatcher::new(capacity))),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryMessageStore::new())),
            statistics: Arc::new(StatisticsRegistry::new()),
            repository: self
                .repository
                .unwrap_or_else(|| Arc::new(InMemoryChannelRepository::new())),
            global_map: Arc::new(GlobalMap::new()),
            global_channel_maps: DashMap::new(),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_channel_map_is_shared_per_id() {
        let context = EngineContext::builder(EngineConfig::default()).build();
        context.global_channel_map("adt").put("count", json!(1));

        assert_eq!(context.global_channel_map("adt").get("count"), Some(json!(1)));
        assert!(context.global_channel_map("lab").is_empty());
    }
}
