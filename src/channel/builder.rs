//! Assembles a runtime [`Channel`] from its definition.

use super::chain::DestinationChain;
use super::response_selector::ResponseSelector;
use super::runtime::{Channel, ChannelParts};
use super::services::ChannelServices;
use crate::config::{ChannelConfig, ConfigResult, ConfigurationError, ConnectorConfig};
use crate::connector::{DestinationConnector, QueuePolicy, SourceConnector};
use crate::constants::{destination_key, SOURCE_METADATA_ID};
use crate::engine::EngineContext;
use crate::error::Result;
use crate::pipeline::{FilterTransformerExecutor, PipelineContext, ResponseTransformerExecutor};
use crate::storage::StorageSettings;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Enabled destinations with their metadata ids, in definition order.
///
/// Destinations without an id get one past the highest id in the channel.
pub fn assign_metadata_ids(config: &ChannelConfig) -> ConfigResult<Vec<(u32, &ConnectorConfig)>> {
    let mut next = config.next_metadata_id();
    let mut seen = HashSet::from([SOURCE_METADATA_ID]);
    let mut assigned = Vec::with_capacity(config.destinations.len());

    for destination in &config.destinations {
        let metadata_id = match destination.metadata_id {
            Some(id) => id,
            None => {
                let id = next;
                next += 1;
                id
            }
        };
        if !seen.insert(metadata_id) {
            return Err(ConfigurationError::DuplicateMetadataId {
                channel_id: config.id.clone(),
                metadata_id,
            });
        }
        if destination.enabled {
            assigned.push((metadata_id, destination));
        }
    }

    Ok(assigned)
}

/// Destination name to `d<metadata id>`
pub fn destination_name_map(destinations: &[(u32, &ConnectorConfig)]) -> HashMap<String, String> {
    destinations
        .iter()
        .map(|(id, d)| (d.name.clone(), destination_key(*id)))
        .collect()
}

/// Build every connector, pipeline and chain of one channel
pub fn build_channel(config: &ChannelConfig, context: &EngineContext) -> Result<Arc<Channel>> {
    let destinations = assign_metadata_ids(config)?;
    let properties = &config.properties;

    let services = ChannelServices {
        channel_id: config.id.clone(),
        events: Arc::clone(&context.events),
        store: Arc::clone(&context.store),
        statistics: Arc::clone(&context.statistics),
        storage: StorageSettings::from_mode(
            properties.storage_mode,
            properties.storage_overrides,
        ),
    };

    let global_channel_map = context.global_channel_map(&config.id);
    if properties.clear_global_channel_map {
        global_channel_map.clear();
    }

    let pipeline_context = PipelineContext {
        channel_id: config.id.clone(),
        destination_name_map: Arc::new(destination_name_map(&destinations)),
        global_channel_map,
        global_map: Arc::clone(&context.global_map),
    };

    let source = SourceConnector::new(
        context.connectors.create_source(&config.source)?,
        FilterTransformerExecutor::build(
            SOURCE_METADATA_ID,
            &config.source,
            &context.data_types,
            Arc::clone(&context.evaluator),
            pipeline_context.clone(),
        )?,
        config.source.response.clone(),
        services.clone(),
    );

    let buffer_size = properties
        .queue_buffer_size
        .unwrap_or(context.config.queue_buffer_size);

    let mut chains: Vec<DestinationChain> = Vec::new();
    for (metadata_id, destination) in &destinations {
        let connector = DestinationConnector::new(
            *metadata_id,
            &destination.name,
            context.connectors.create_destination(destination)?,
            destination.properties.clone(),
            FilterTransformerExecutor::build(
                *metadata_id,
                destination,
                &context.data_types,
                Arc::clone(&context.evaluator),
                pipeline_context.clone(),
            )?,
            ResponseTransformerExecutor::build(
                *metadata_id,
                destination,
                &context.data_types,
                Arc::clone(&context.evaluator),
                pipeline_context.clone(),
            )?,
            QueuePolicy::resolve(&destination.queue, &context.config.retry, buffer_size),
            services.clone(),
            context.config.stop_timeout(),
        );

        match chains.last_mut() {
            Some(chain) if destination.wait_for_previous => chain.push(Arc::new(connector)),
            _ => {
                let mut chain = DestinationChain::new();
                chain.push(Arc::new(connector));
                chains.push(chain);
            }
        }
    }

    debug!(
        channel_id = %config.id,
        destinations = destinations.len(),
        chains = chains.len(),
        "CHANNEL: Built runtime channel"
    );

    Ok(Arc::new(Channel::from_parts(ChannelParts {
        id: config.id.clone(),
        name: config.name.clone(),
        revision: config.revision,
        tags: config.tags.clone(),
        initial_state: properties.initial_state,
        response_selector: ResponseSelector::new(
            config.source.response.respond_from.clone(),
            Arc::clone(&pipeline_context.destination_name_map),
        ),
        source,
        chains,
        source_queue_capacity: buffer_size.max(1),
        context: pipeline_context,
        services,
        stop_timeout: context.config.stop_timeout(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelConfig {
        ChannelConfig::new("adt", "ADT", ConnectorConfig::new("Source", "push"))
            .with_destination(ConnectorConfig::new("Archive", "capture").with_metadata_id(3))
            .with_destination(ConnectorConfig::new("Lab", "capture"))
            .with_destination(ConnectorConfig::new("Billing", "capture").disabled())
            .with_destination(ConnectorConfig::new("Audit", "capture"))
    }

    #[test]
    fn test_missing_ids_follow_the_highest() {
        let config = channel();
        let assigned: Vec<(u32, String)> = assign_metadata_ids(&config)
            .unwrap()
            .into_iter()
            .map(|(id, d)| (id, d.name.clone()))
            .collect();

        assert_eq!(
            assigned,
            vec![
                (3, "Archive".to_string()),
                (4, "Lab".to_string()),
                (6, "Audit".to_string()),
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let config = ChannelConfig::new("adt", "ADT", ConnectorConfig::new("Source", "push"))
            .with_destination(ConnectorConfig::new("A", "capture").with_metadata_id(1))
            .with_destination(ConnectorConfig::new("B", "capture").with_metadata_id(1));
        assert!(matches!(
            assign_metadata_ids(&config),
            Err(ConfigurationError::DuplicateMetadataId { metadata_id: 1, .. })
        ));

        let zero = ChannelConfig::new("adt", "ADT", ConnectorConfig::new("Source", "push"))
            .with_destination(ConnectorConfig::new("A", "capture").with_metadata_id(0));
        assert!(assign_metadata_ids(&zero).is_err());
    }

    #[test]
    fn test_name_map_uses_destination_keys() {
        let config = channel();
        let assigned = assign_metadata_ids(&config).unwrap();
        let names = destination_name_map(&assigned);
        assert_eq!(names.get("Lab"), Some(&"d4".to_string()));
        assert!(!names.contains_key("Billing"));
    }
}
