use crate::message::{ConnectorMessage, Message};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named preset controlling which artifacts of a message are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStorageMode {
    #[default]
    Development,
    Production,
    Raw,
    Metadata,
    Disabled,
}

impl MessageStorageMode {
    pub const ALL: [MessageStorageMode; 5] = [
        Self::Development,
        Self::Production,
        Self::Raw,
        Self::Metadata,
        Self::Disabled,
    ];
}

impl fmt::Display for MessageStorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "DEVELOPMENT",
            Self::Production => "PRODUCTION",
            Self::Raw => "RAW",
            Self::Metadata => "METADATA",
            Self::Disabled => "DISABLED",
        };
        f.write_str(name)
    }
}

impl FromStr for MessageStorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEVELOPMENT" => Ok(Self::Development),
            "PRODUCTION" => Ok(Self::Production),
            "RAW" => Ok(Self::Raw),
            "METADATA" => Ok(Self::Metadata),
            "DISABLED" => Ok(Self::Disabled),
            other => Err(format!("Unknown message storage mode: {other}")),
        }
    }
}

/// Per-channel flags layered on top of any storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOverrides {
    pub remove_content_on_completion: bool,
    pub remove_attachments_on_completion: bool,
    pub store_attachments: bool,
}

/// Fully resolved persistence flags for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub enabled: bool,
    pub durable: bool,
    pub raw_durable: bool,
    pub message_recovery_enabled: bool,
    pub remove_content_on_completion: bool,
    pub remove_attachments_on_completion: bool,
    pub store_attachments: bool,
    pub store_custom_metadata: bool,
    pub store_raw: bool,
    pub store_processed_raw: bool,
    pub store_transformed: bool,
    pub store_source_encoded: bool,
    pub store_destination_encoded: bool,
    pub store_sent: bool,
    pub store_response: bool,
    pub store_response_transformed: bool,
    pub store_processed_response: bool,
    pub store_sent_response: bool,
    pub store_maps: bool,
    pub store_response_map: bool,
    pub store_merged_response_map: bool,
}

impl StorageSettings {
    /// Every artifact persisted; the baseline that modes subtract from
    fn all_enabled(overrides: StorageOverrides) -> Self {
        Self {
            enabled: true,
            durable: true,
            raw_durable: true,
            message_recovery_enabled: true,
            remove_content_on_completion: overrides.remove_content_on_completion,
            remove_attachments_on_completion: overrides.remove_attachments_on_completion,
            store_attachments: overrides.store_attachments,
            store_custom_metadata: true,
            store_raw: true,
            store_processed_raw: true,
            store_transformed: true,
            store_source_encoded: true,
            store_destination_encoded: true,
            store_sent: true,
            store_response: true,
            store_response_transformed: true,
            store_processed_response: true,
            store_sent_response: true,
            store_maps: true,
            store_response_map: true,
            store_merged_response_map: true,
        }
    }

    /// Resolve settings for a mode. Every flag is assigned; the result depends
    /// only on the arguments.
    pub fn from_mode(mode: MessageStorageMode, overrides: StorageOverrides) -> Self {
        let mut settings = Self::all_enabled(overrides);

        match mode {
            MessageStorageMode::Development => {}
            MessageStorageMode::Production => {
                settings.store_processed_raw = false;
                settings.store_transformed = false;
                settings.store_response_transformed = false;
                settings.store_processed_response = false;
            }
            MessageStorageMode::Raw => {
                settings.message_recovery_enabled = false;
                settings.durable = false;
                settings.disable_maps();
                settings.disable_content_after_raw();
            }
            MessageStorageMode::Metadata => {
                settings.message_recovery_enabled = false;
                settings.durable = false;
                settings.raw_durable = false;
                settings.store_raw = false;
                settings.disable_maps();
                settings.disable_content_after_raw();
            }
            MessageStorageMode::Disabled => {
                settings.enabled = false;
                settings.message_recovery_enabled = false;
                settings.durable = false;
                settings.raw_durable = false;
                settings.store_custom_metadata = false;
                settings.store_raw = false;
                settings.disable_maps();
                settings.disable_content_after_raw();
            }
        }

        settings
    }

    fn disable_maps(&mut self) {
        self.store_maps = false;
        self.store_response_map = false;
        self.store_merged_response_map = false;
    }

    fn disable_content_after_raw(&mut self) {
        self.store_processed_raw = false;
        self.store_transformed = false;
        self.store_source_encoded = false;
        self.store_destination_encoded = false;
        self.store_sent = false;
        self.store_response = false;
        self.store_response_transformed = false;
        self.store_processed_response = false;
        self.store_sent_response = false;
    }

    /// Copy of a connector message carrying only the artifacts these settings persist
    pub fn project(&self, message: &ConnectorMessage) -> ConnectorMessage {
        let mut projected = message.clone();
        let is_source = message.metadata_id == crate::constants::SOURCE_METADATA_ID;

        if !self.store_raw {
            projected.raw = None;
        }
        if !self.store_processed_raw {
            projected.processed_raw = None;
        }
        if !self.store_transformed {
            projected.transformed = None;
        }
        let store_encoded = if is_source {
            self.store_source_encoded
        } else {
            self.store_destination_encoded
        };
        if !store_encoded {
            projected.encoded = None;
        }
        if !self.store_sent {
            projected.sent = None;
        }
        if !self.store_response {
            projected.response = None;
        }
        if !self.store_response_transformed {
            projected.response_transformed = None;
        }
        if !self.store_processed_response {
            projected.processed_response = None;
        }
        if !self.store_maps {
            projected.source_map = Default::default();
            projected.channel_map.clear();
        }
        if !self.store_response_map {
            projected.response_map.clear();
        }
        projected
    }

    /// Whether a completed message should have its content removed
    pub fn should_remove_content(&self, message: &Message) -> bool {
        self.enabled && self.remove_content_on_completion && message.is_complete()
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self::from_mode(MessageStorageMode::default(), StorageOverrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageContent;
    use std::sync::Arc;

    #[test]
    fn test_development_enables_everything() {
        let settings =
            StorageSettings::from_mode(MessageStorageMode::Development, StorageOverrides::default());
        assert!(settings.enabled);
        assert!(settings.store_processed_raw);
        assert!(settings.store_merged_response_map);
        assert!(!settings.remove_content_on_completion);
    }

    #[test]
    fn test_production_drops_intermediate_stages() {
        let settings =
            StorageSettings::from_mode(MessageStorageMode::Production, StorageOverrides::default());
        assert!(settings.durable);
        assert!(settings.store_raw);
        assert!(settings.store_sent);
        assert!(!settings.store_processed_raw);
        assert!(!settings.store_transformed);
        assert!(!settings.store_response_transformed);
        assert!(!settings.store_processed_response);
    }

    #[test]
    fn test_metadata_keeps_only_counters() {
        let settings =
            StorageSettings::from_mode(MessageStorageMode::Metadata, StorageOverrides::default());
        assert!(settings.enabled);
        assert!(settings.store_custom_metadata);
        assert!(!settings.store_raw);
        assert!(!settings.raw_durable);
        assert!(!settings.store_maps);
        assert!(!settings.store_sent);
    }

    #[test]
    fn test_disabled_turns_storage_off() {
        let settings = StorageSettings::from_mode(
            MessageStorageMode::Disabled,
            StorageOverrides {
                store_attachments: true,
                ..Default::default()
            },
        );
        assert!(!settings.enabled);
        assert!(!settings.store_custom_metadata);
        assert!(settings.store_attachments);
    }

    #[test]
    fn test_raw_projection_strips_stages() {
        let settings =
            StorageSettings::from_mode(MessageStorageMode::Raw, StorageOverrides::default());
        let mut message = ConnectorMessage::new(
            1,
            "c",
            0,
            "Source",
            MessageContent::new("raw", "RAW"),
            Arc::default(),
        );
        message.transformed = Some(MessageContent::new("t", "RAW"));
        message.encoded = Some(MessageContent::new("e", "RAW"));

        let projected = settings.project(&message);
        assert!(projected.raw.is_some());
        assert!(projected.transformed.is_none());
        assert!(projected.encoded.is_none());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "metadata".parse::<MessageStorageMode>().unwrap(),
            MessageStorageMode::Metadata
        );
        assert!("bogus".parse::<MessageStorageMode>().is_err());
    }
}
