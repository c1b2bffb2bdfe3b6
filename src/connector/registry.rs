//! # Connector Registry
//!
//! Maps a stable transport type id to a factory that builds the transport for
//! one connector. Resolution happens at deploy time and unknown ids fail with
//! a typed configuration error.

use super::transport::{DestinationTransport, SourceTransport};
use crate::config::{ConfigurationError, ConnectorConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub type SourceFactory =
    Arc<dyn Fn(&ConnectorConfig) -> Result<Arc<dyn SourceTransport>, ConfigurationError> + Send + Sync>;

pub type DestinationFactory = Arc<
    dyn Fn(&ConnectorConfig) -> Result<Arc<dyn DestinationTransport>, ConfigurationError>
        + Send
        + Sync,
>;

#[derive(Default)]
pub struct ConnectorRegistry {
    sources: RwLock<HashMap<String, SourceFactory>>,
    destinations: RwLock<HashMap<String, DestinationFactory>>,
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("sources", &self.source_types())
            .field("destinations", &self.destination_types())
            .finish()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<F>(&self, transport_type: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn SourceTransport>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        let transport_type = transport_type.into();
        debug!(transport_type = %transport_type, "Registered source transport");
        self.sources.write().insert(transport_type, Arc::new(factory));
    }

    pub fn register_destination<F>(&self, transport_type: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn DestinationTransport>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        let transport_type = transport_type.into();
        debug!(transport_type = %transport_type, "Registered destination transport");
        self.destinations
            .write()
            .insert(transport_type, Arc::new(factory));
    }

    pub fn create_source(
        &self,
        config: &ConnectorConfig,
    ) -> Result<Arc<dyn SourceTransport>, ConfigurationError> {
        let factory = self
            .sources
            .read()
            .get(&config.transport_type)
            .cloned()
            .ok_or_else(|| {
                ConfigurationError::unknown_connector_type(&config.transport_type, &config.name)
            })?;
        factory(config)
    }

    pub fn create_destination(
        &self,
        config: &ConnectorConfig,
    ) -> Result<Arc<dyn DestinationTransport>, ConfigurationError> {
        let factory = self
            .destinations
            .read()
            .get(&config.transport_type)
            .cloned()
            .ok_or_else(|| {
                ConfigurationError::unknown_connector_type(&config.transport_type, &config.name)
            })?;
        factory(config)
    }

    pub fn source_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.sources.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn destination_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.destinations.read().keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::transport::{ConnectorLifecycle, TransportResult};
    use crate::message::{ConnectorMessage, Response};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Echo;

    impl ConnectorLifecycle for Echo {}

    #[async_trait]
    impl DestinationTransport for Echo {
        async fn send(
            &self,
            _properties: &Value,
            message: &ConnectorMessage,
        ) -> TransportResult<Response> {
            Ok(Response::sent(message.encoded_content()))
        }
    }

    #[test]
    fn test_unknown_type_is_typed_error() {
        let registry = ConnectorRegistry::new();
        let config = ConnectorConfig::new("Lab", "tcp_sender");
        let err = registry.create_destination(&config).err().unwrap();
        assert!(matches!(
            err,
            ConfigurationError::UnknownConnectorType { ref transport_type, .. } if transport_type == "tcp_sender"
        ));
    }

    #[test]
    fn test_registered_factory_is_used() {
        let registry = ConnectorRegistry::new();
        registry.register_destination("echo", |_config| Ok(Arc::new(Echo) as Arc<dyn DestinationTransport>));
        assert_eq!(registry.destination_types(), vec!["echo".to_string()]);
        assert!(registry
            .create_destination(&ConnectorConfig::new("Lab", "echo"))
            .is_ok());
    }
}
