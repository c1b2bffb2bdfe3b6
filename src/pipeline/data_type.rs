//! Data types and their serializers.
//!
//! Plugins are registered by name in a [`DataTypeRegistry`] and resolved when
//! a channel is deployed.

use super::errors::PipelineError;
use crate::config::ConfigurationError;
use crate::constants::data_types;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerializationType {
    Raw,
    Xml,
    Json,
}

/// Converts between a data type's wire form and the internal form scripts see
pub trait MessageSerializer: Send + Sync + fmt::Debug {
    /// Whether content must pass through the serializer in this direction
    fn is_serialization_required(&self, to_internal: bool) -> bool;

    fn to_internal(&self, content: &str) -> Result<String, String>;

    fn from_internal(&self, content: &str) -> Result<String, String>;
}

pub trait DataTypePlugin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn serialization_type(&self) -> SerializationType;

    fn is_binary(&self) -> bool {
        false
    }

    fn serializer(&self, properties: &Value) -> Result<Arc<dyn MessageSerializer>, String>;
}

/// Serializer that hands content through untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSerializer;

impl MessageSerializer for PassthroughSerializer {
    fn is_serialization_required(&self, _to_internal: bool) -> bool {
        false
    }

    fn to_internal(&self, content: &str) -> Result<String, String> {
        Ok(content.to_string())
    }

    fn from_internal(&self, content: &str) -> Result<String, String> {
        Ok(content.to_string())
    }
}

fn namespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\s+xmlns(:[A-Za-z_][\w.-]*)?\s*=\s*("[^"]*"|'[^']*')"#)
            .expect("namespace pattern is valid")
    })
}

/// XML serializer with optional namespace stripping on the inbound side
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSerializer {
    strip_namespaces: bool,
}

impl MessageSerializer for XmlSerializer {
    fn is_serialization_required(&self, to_internal: bool) -> bool {
        to_internal && self.strip_namespaces
    }

    fn to_internal(&self, content: &str) -> Result<String, String> {
        if self.strip_namespaces {
            Ok(namespace_pattern().replace_all(content, "").into_owned())
        } else {
            Ok(content.to_string())
        }
    }

    fn from_internal(&self, content: &str) -> Result<String, String> {
        Ok(content.to_string())
    }
}

/// JSON serializer that validates content when asked to
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    validate: bool,
}

impl MessageSerializer for JsonSerializer {
    fn is_serialization_required(&self, _to_internal: bool) -> bool {
        self.validate
    }

    fn to_internal(&self, content: &str) -> Result<String, String> {
        if self.validate {
            serde_json::from_str::<Value>(content).map_err(|e| e.to_string())?;
        }
        Ok(content.to_string())
    }

    fn from_internal(&self, content: &str) -> Result<String, String> {
        self.to_internal(content)
    }
}

#[derive(Debug, Clone)]
struct BuiltinDataType {
    name: &'static str,
    serialization_type: SerializationType,
}

impl DataTypePlugin for BuiltinDataType {
    fn name(&self) -> &str {
        self.name
    }

    fn serialization_type(&self) -> SerializationType {
        self.serialization_type
    }

    fn serializer(&self, properties: &Value) -> Result<Arc<dyn MessageSerializer>, String> {
        let flag = |key: &str| -> Result<bool, String> {
            match properties.get(key) {
                None | Some(Value::Null) => Ok(false),
                Some(Value::Bool(value)) => Ok(*value),
                Some(other) => Err(format!("'{key}' must be a boolean, got {other}")),
            }
        };

        Ok(match self.serialization_type {
            SerializationType::Raw => Arc::new(PassthroughSerializer),
            SerializationType::Xml => Arc::new(XmlSerializer {
                strip_namespaces: flag("strip_namespaces")?,
            }),
            SerializationType::Json => Arc::new(JsonSerializer {
                validate: flag("validate")?,
            }),
        })
    }
}

/// A resolved data type: plugin plus a serializer built from connector properties
#[derive(Clone)]
pub struct DataType {
    name: String,
    plugin: Arc<dyn DataTypePlugin>,
    serializer: Arc<dyn MessageSerializer>,
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataType")
            .field("name", &self.name)
            .field("serializer", &self.serializer)
            .finish()
    }
}

impl DataType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin(&self) -> &Arc<dyn DataTypePlugin> {
        &self.plugin
    }

    pub fn serializer(&self) -> &Arc<dyn MessageSerializer> {
        &self.serializer
    }

    /// Raw and binary types keep templates verbatim
    pub fn keeps_template_verbatim(&self) -> bool {
        self.plugin.is_binary() || self.plugin.serialization_type() == SerializationType::Raw
    }

    pub fn to_internal(&self, connector: &str, content: &str) -> Result<String, PipelineError> {
        self.serializer
            .to_internal(content)
            .map_err(|reason| PipelineError::serialization(connector, &self.name, reason))
    }

    pub fn from_internal(&self, connector: &str, content: &str) -> Result<String, PipelineError> {
        self.serializer
            .from_internal(content)
            .map_err(|reason| PipelineError::serialization(connector, &self.name, reason))
    }
}

/// Name → plugin registry
#[derive(Debug)]
pub struct DataTypeRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn DataTypePlugin>>>,
}

impl DataTypeRegistry {
    pub fn empty() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the RAW, XML and JSON data types
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        for (name, serialization_type) in [
            (data_types::RAW, SerializationType::Raw),
            (data_types::XML, SerializationType::Xml),
            (data_types::JSON, SerializationType::Json),
        ] {
            registry.register(Arc::new(BuiltinDataType {
                name,
                serialization_type,
            }));
        }
        registry
    }

    pub fn register(&self, plugin: Arc<dyn DataTypePlugin>) {
        self.plugins
            .write()
            .insert(plugin.name().to_ascii_uppercase(), plugin);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a data type for a connector
    pub fn resolve(
        &self,
        name: &str,
        properties: &Value,
        connector: &str,
    ) -> Result<DataType, ConfigurationError> {
        let plugin = self
            .plugins
            .read()
            .get(&name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| ConfigurationError::unknown_data_type(name, connector))?;

        let serializer = plugin
            .serializer(properties)
            .map_err(|reason| ConfigurationError::invalid_connector_properties(connector, reason))?;

        Ok(DataType {
            name: plugin.name().to_string(),
            plugin,
            serializer,
        })
    }
}

impl Default for DataTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
