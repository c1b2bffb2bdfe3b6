//! Alert definitions as configured by operators.

use crate::events::{ErrorEvent, ErrorEventType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Trigger type id handled by the default error worker
pub const ERROR_TRIGGER_TYPE: &str = "error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub trigger: AlertTrigger,
    #[serde(default)]
    pub action_groups: Vec<ActionGroup>,
}

impl AlertModel {
    pub fn new(id: impl Into<String>, name: impl Into<String>, trigger: AlertTrigger) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            trigger,
            action_groups: Vec::new(),
        }
    }

    pub fn with_action_group(mut self, group: ActionGroup) -> Self {
        self.action_groups.push(group);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Condition an alert reacts to; each variant is served by one worker type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertTrigger {
    Error(ErrorTrigger),
    /// Trigger handled by a worker registered outside the engine
    Custom {
        trigger_type: String,
        #[serde(default)]
        properties: Value,
    },
}

impl AlertTrigger {
    pub fn trigger_type(&self) -> &str {
        match self {
            Self::Error(_) => ERROR_TRIGGER_TYPE,
            Self::Custom { trigger_type, .. } => trigger_type,
        }
    }
}

/// Fires on error events of the selected types, channels and connectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorTrigger {
    /// Empty or containing `Any` matches every type
    pub event_types: HashSet<ErrorEventType>,
    pub channels: AlertChannels,
    /// Matched against the formatted error message
    pub regex: Option<String>,
}

impl ErrorTrigger {
    pub fn with_event_type(mut self, event_type: ErrorEventType) -> Self {
        self.event_types.insert(event_type);
        self
    }

    pub fn with_channels(mut self, channels: AlertChannels) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    pub fn matches_type(&self, event_type: ErrorEventType) -> bool {
        self.event_types.is_empty()
            || self.event_types.contains(&ErrorEventType::Any)
            || self.event_types.contains(&event_type)
    }

    /// Type and channel/connector selection; the regex is checked by the worker
    pub fn selects(&self, event: &ErrorEvent) -> bool {
        self.matches_type(event.event_type)
            && self
                .channels
                .is_enabled(event.channel_id.as_deref(), event.metadata_id)
    }
}

/// Channel and connector selection of an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertChannels {
    /// Every channel, including ones deployed later
    pub all_channels: bool,
    pub channels: HashSet<String>,
    /// Connectors excluded per channel id
    pub excluded_connectors: HashMap<String, HashSet<u32>>,
}

impl Default for AlertChannels {
    fn default() -> Self {
        Self {
            all_channels: true,
            channels: HashSet::new(),
            excluded_connectors: HashMap::new(),
        }
    }
}

impl AlertChannels {
    pub fn only(channel_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            all_channels: false,
            channels: channel_ids.into_iter().map(Into::into).collect(),
            excluded_connectors: HashMap::new(),
        }
    }

    pub fn excluding_connector(mut self, channel_id: impl Into<String>, metadata_id: u32) -> Self {
        self.excluded_connectors
            .entry(channel_id.into())
            .or_default()
            .insert(metadata_id);
        self
    }

    /// Events without a channel only match an all-channel selection
    pub fn is_enabled(&self, channel_id: Option<&str>, metadata_id: Option<u32>) -> bool {
        let Some(channel_id) = channel_id else {
            return self.all_channels;
        };
        if !self.all_channels && !self.channels.contains(channel_id) {
            return false;
        }
        match (metadata_id, self.excluded_connectors.get(channel_id)) {
            (Some(id), Some(excluded)) => !excluded.contains(&id),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertProtocol {
    Email,
    /// Route the alert body into a channel as a raw message
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    pub protocol: AlertProtocol,
    /// E-mail address or channel id; may contain `${key}` tokens
    pub recipient: String,
}

impl AlertAction {
    pub fn email(recipient: impl Into<String>) -> Self {
        Self {
            protocol: AlertProtocol::Email,
            recipient: recipient.into(),
        }
    }

    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            protocol: AlertProtocol::Channel,
            recipient: channel_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionGroup {
    pub actions: Vec<AlertAction>,
    pub subject: Option<String>,
    pub template: Option<String>,
}

impl ActionGroup {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: AlertAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Dashboard row for one alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStatus {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub alerted_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_type_set_matches_everything() {
        let trigger = ErrorTrigger::default();
        assert!(trigger.matches_type(ErrorEventType::Deploy));

        let filter_only = ErrorTrigger::default().with_event_type(ErrorEventType::Filter);
        assert!(filter_only.matches_type(ErrorEventType::Filter));
        assert!(!filter_only.matches_type(ErrorEventType::Deploy));
    }

    #[test]
    fn test_channel_selection() {
        let selection = AlertChannels::only(["adt"]).excluding_connector("adt", 2);
        assert!(selection.is_enabled(Some("adt"), Some(1)));
        assert!(!selection.is_enabled(Some("adt"), Some(2)));
        assert!(selection.is_enabled(Some("adt"), None));
        assert!(!selection.is_enabled(Some("lab"), Some(1)));
        assert!(!selection.is_enabled(None, None));
        assert!(AlertChannels::default().is_enabled(None, None));
    }

    #[test]
    fn test_trigger_deserializes_with_type_tag() {
        let trigger: AlertTrigger = serde_json::from_value(serde_json::json!({
            "type": "error",
            "event_types": ["DESTINATION_CONNECTOR"],
            "regex": "timeout"
        }))
        .unwrap();
        assert_eq!(trigger.trigger_type(), ERROR_TRIGGER_TYPE);

        let custom: AlertTrigger = serde_json::from_value(serde_json::json!({
            "type": "custom",
            "trigger_type": "queue_depth"
        }))
        .unwrap();
        assert_eq!(custom.trigger_type(), "queue_depth");
    }
}
