//! Shared harness for the integration tests.

#![allow(dead_code)] // Each test binary uses a different subset

pub mod builders;
pub mod strategies;

pub use builders::*;

use courier_core::config::{ChannelConfig, EngineConfig};
use courier_core::engine::{EngineBootstrap, EngineController, InMemoryChannelRepository};
use courier_core::storage::MemoryMessageStore;
use courier_core::test_helpers::{test_engine_config, MockConnectors, RecordingListener, ScriptedEvaluator};
use courier_core::Channel;
use std::sync::Arc;

/// A bootstrapped engine wired to mocks the test keeps handles on
pub struct TestEngine {
    pub connectors: MockConnectors,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub repository: Arc<InMemoryChannelRepository>,
    pub store: Arc<MemoryMessageStore>,
    pub listener: Arc<RecordingListener>,
    pub bootstrap: EngineBootstrap,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(test_engine_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let connectors = MockConnectors::new();
        let evaluator = Arc::new(ScriptedEvaluator::new());
        let repository = Arc::new(InMemoryChannelRepository::new());
        let store = Arc::new(MemoryMessageStore::new());

        let bootstrap = EngineBootstrap::from_config(config, |builder| {
            builder
                .with_connectors(connectors.registry())
                .with_evaluator(evaluator.clone())
                .with_repository(repository.clone())
                .with_store(store.clone())
        })
        .expect("test configuration is valid");

        let listener = Arc::new(RecordingListener::new("test-recorder"));
        bootstrap.context().events.add_listener(listener.clone());

        Self {
            connectors,
            evaluator,
            repository,
            store,
            listener,
            bootstrap,
        }
    }

    pub fn engine(&self) -> &Arc<EngineController> {
        self.bootstrap.engine()
    }

    pub fn save(&self, channel: ChannelConfig) {
        self.repository.save(channel);
    }

    /// Save and deploy one channel, returning the deployed runtime
    pub async fn deploy(&self, channel: ChannelConfig) -> Arc<Channel> {
        let id = channel.id.clone();
        self.save(channel);
        self.engine()
            .deploy_channels(&[id.clone()])
            .await
            .expect("deploy batch completes");
        self.engine()
            .channel(&id)
            .expect("channel should be deployed")
    }
}
