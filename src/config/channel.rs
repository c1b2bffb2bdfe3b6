//! Channel definitions consumed at deploy time.

use crate::constants::data_types;
use crate::state_machine::InitialState;
use crate::storage::{MessageStorageMode, StorageOverrides};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_data_type() -> String {
    data_types::RAW.to_string()
}

/// Complete definition of one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub revision: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: ConnectorConfig,
    #[serde(default)]
    pub destinations: Vec<ConnectorConfig>,
    #[serde(default)]
    pub properties: ChannelProperties,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: ConnectorConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            revision: 1,
            enabled: true,
            description: String::new(),
            tags: Vec::new(),
            source,
            destinations: Vec::new(),
            properties: ChannelProperties::default(),
        }
    }

    pub fn with_destination(mut self, destination: ConnectorConfig) -> Self {
        self.destinations.push(destination);
        self
    }

    pub fn with_properties(mut self, properties: ChannelProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Next free destination metadata id
    pub fn next_metadata_id(&self) -> u32 {
        self.destinations
            .iter()
            .filter_map(|d| d.metadata_id)
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelProperties {
    pub initial_state: InitialState,
    pub storage_mode: MessageStorageMode,
    #[serde(flatten)]
    pub storage_overrides: StorageOverrides,
    pub clear_global_channel_map: bool,
    /// Overrides the engine-wide queue buffer size for this channel
    pub queue_buffer_size: Option<usize>,
    pub metadata_columns: Vec<MetadataColumn>,
}

impl Default for ChannelProperties {
    fn default() -> Self {
        Self {
            initial_state: InitialState::Started,
            storage_mode: MessageStorageMode::Development,
            storage_overrides: StorageOverrides::default(),
            clear_global_channel_map: true,
            queue_buffer_size: None,
            metadata_columns: Vec::new(),
        }
    }
}

/// Custom metadata extracted from a message's maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataColumn {
    pub name: String,
    #[serde(default = "MetadataColumn::default_type")]
    pub column_type: String,
    pub mapping_name: String,
}

impl MetadataColumn {
    fn default_type() -> String {
        "STRING".to_string()
    }
}

/// Definition of a source or destination connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    /// Assigned automatically for destinations when absent; the source is always 0
    #[serde(default)]
    pub metadata_id: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub transport_type: String,
    /// Transport-specific properties, opaque to the engine
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub response_transformer: TransformerConfig,
    /// A destination with this unset starts a new chain
    #[serde(default = "default_true")]
    pub wait_for_previous: bool,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub response: ResponseConfig,
}

impl ConnectorConfig {
    pub fn new(name: impl Into<String>, transport_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata_id: None,
            enabled: true,
            transport_type: transport_type.into(),
            properties: Value::Null,
            filter: FilterConfig::default(),
            transformer: TransformerConfig::default(),
            response_transformer: TransformerConfig::default(),
            wait_for_previous: true,
            queue: QueueConfig::default(),
            response: ResponseConfig::default(),
        }
    }

    pub fn with_metadata_id(mut self, metadata_id: u32) -> Self {
        self.metadata_id = Some(metadata_id);
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_transformer(mut self, transformer: TransformerConfig) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_response_transformer(mut self, transformer: TransformerConfig) -> Self {
        self.response_transformer = transformer;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_response(mut self, response: ResponseConfig) -> Self {
        self.response = response;
        self
    }

    pub fn new_chain(mut self) -> Self {
        self.wait_for_previous = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub name: String,
    #[serde(default)]
    pub operator: RuleOperator,
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

impl FilterConfig {
    pub fn with_rule(mut self, name: impl Into<String>, script: impl Into<String>) -> Self {
        self.rules.push(FilterRule {
            name: name.into(),
            operator: RuleOperator::And,
            script: script.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerStep {
    pub name: String,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    #[serde(default)]
    pub steps: Vec<TransformerStep>,
    #[serde(default = "default_data_type")]
    pub inbound_data_type: String,
    #[serde(default = "default_data_type")]
    pub outbound_data_type: String,
    #[serde(default)]
    pub inbound_properties: Value,
    #[serde(default)]
    pub outbound_properties: Value,
    #[serde(default)]
    pub outbound_template: Option<String>,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            inbound_data_type: default_data_type(),
            outbound_data_type: default_data_type(),
            inbound_properties: Value::Null,
            outbound_properties: Value::Null,
            outbound_template: None,
        }
    }
}

impl TransformerConfig {
    pub fn with_data_types(inbound: impl Into<String>, outbound: impl Into<String>) -> Self {
        Self {
            inbound_data_type: inbound.into(),
            outbound_data_type: outbound.into(),
            ..Default::default()
        }
    }

    pub fn with_step(mut self, name: impl Into<String>, script: impl Into<String>) -> Self {
        self.steps.push(TransformerStep {
            name: name.into(),
            script: script.into(),
        });
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.outbound_template = Some(template.into());
        self
    }

    pub fn with_outbound_properties(mut self, properties: Value) -> Self {
        self.outbound_properties = properties;
        self
    }

    pub fn with_inbound_properties(mut self, properties: Value) -> Self {
        self.inbound_properties = properties;
        self
    }

    /// Configured template with surrounding whitespace ignored
    pub fn template(&self) -> Option<&str> {
        self.outbound_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Destination queue and retry policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub enabled: bool,
    /// Failed head moves to the back, and a full queue evicts its oldest entry
    pub rotate: bool,
    pub retry_interval_ms: Option<u64>,
    /// 0 retries forever
    pub retry_count: Option<u32>,
    pub buffer_size: Option<usize>,
}

impl QueueConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn rotating() -> Self {
        Self {
            enabled: true,
            rotate: true,
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry_interval_ms: u64, retry_count: u32) -> Self {
        self.retry_interval_ms = Some(retry_interval_ms);
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }
}

/// Which response a source hands back to its caller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResponseSelection {
    None,
    #[default]
    Auto,
    Destination(String),
    ResponseMap(String),
}

/// Source-side response policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// When false the source acknowledges immediately and processes from its queue
    pub respond_after_processing: bool,
    pub respond_from: ResponseSelection,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            respond_after_processing: true,
            respond_from: ResponseSelection::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_defaults_from_json() {
        let json = serde_json::json!({
            "id": "adt",
            "name": "ADT Inbound",
            "source": { "name": "Source", "transport_type": "channel_reader" },
            "destinations": [
                { "name": "Lab", "transport_type": "capture", "metadata_id": 3 },
                { "name": "Billing", "transport_type": "capture", "wait_for_previous": false,
                  "queue": { "enabled": true, "rotate": true } }
            ],
            "properties": { "storage_mode": "PRODUCTION", "remove_content_on_completion": true }
        });

        let config: ChannelConfig = serde_json::from_value(json).unwrap();
        assert!(config.enabled);
        assert_eq!(config.properties.storage_mode, MessageStorageMode::Production);
        assert!(config.properties.storage_overrides.remove_content_on_completion);
        assert!(config.properties.clear_global_channel_map);
        assert_eq!(config.source.transformer.inbound_data_type, "RAW");
        assert!(config.destinations[0].wait_for_previous);
        assert!(!config.destinations[1].wait_for_previous);
        assert!(config.destinations[1].queue.rotate);
        assert_eq!(config.next_metadata_id(), 4);
        assert_eq!(config.source.response.respond_from, ResponseSelection::Auto);
    }

    #[test]
    fn test_blank_template_is_ignored() {
        let transformer = TransformerConfig::default().with_template("   ");
        assert!(transformer.template().is_none());
    }

    #[test]
    fn test_response_selection_serde() {
        let selection: ResponseSelection =
            serde_json::from_value(serde_json::json!({"type": "destination", "value": "Lab"}))
                .unwrap();
        assert_eq!(selection, ResponseSelection::Destination("Lab".to_string()));
    }
}
