//! Configuration Error Types
//!
//! Errors raised while loading engine configuration and while resolving
//! channel definitions into runtime components at deploy time.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    #[error("Failed to parse configuration file '{file_path}': {reason}")]
    ParseError { file_path: String, reason: String },

    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    #[error("Unknown connector type '{transport_type}' for connector '{connector}'")]
    UnknownConnectorType {
        transport_type: String,
        connector: String,
    },

    #[error("Unknown data type '{data_type}' for connector '{connector}'")]
    UnknownDataType { data_type: String, connector: String },

    #[error("Duplicate metadata id {metadata_id} in channel {channel_id}")]
    DuplicateMetadataId { channel_id: String, metadata_id: u32 },

    #[error("Channel definition not found: {channel_id}")]
    ChannelDefinitionNotFound { channel_id: String },

    #[error("Invalid properties for connector '{connector}': {reason}")]
    InvalidConnectorProperties { connector: String, reason: String },
}

impl ConfigurationError {
    pub fn parse_error(file_path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn unknown_connector_type(
        transport_type: impl Into<String>,
        connector: impl Into<String>,
    ) -> Self {
        Self::UnknownConnectorType {
            transport_type: transport_type.into(),
            connector: connector.into(),
        }
    }

    pub fn unknown_data_type(data_type: impl Into<String>, connector: impl Into<String>) -> Self {
        Self::UnknownDataType {
            data_type: data_type.into(),
            connector: connector.into(),
        }
    }

    pub fn invalid_connector_properties(
        connector: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidConnectorProperties {
            connector: connector.into(),
            reason: reason.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
