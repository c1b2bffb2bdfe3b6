//! # Courier Configuration System
//!
//! Engine-wide settings and the channel definitions the engine deploys.
//!
//! ## Architecture
//!
//! - **Layered loading**: base file, then an `<name>.<environment>` overlay,
//!   then `COURIER__*` environment variables
//! - **Explicit validation**: invalid values fail loading instead of falling back
//! - **Channel definitions**: plain serde structs consumed through a repository
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/courier.yaml", "production")?;
//! let buffer = manager.config().queue_buffer_size;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod loader;

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use channel::{
    ChannelConfig, ChannelProperties, ConnectorConfig, FilterConfig, FilterRule, MetadataColumn,
    QueueConfig, ResponseConfig, ResponseSelection, RuleOperator, TransformerConfig,
    TransformerStep,
};
pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub environment: String,
    /// Default read-ahead capacity of every connector queue
    pub queue_buffer_size: usize,
    /// Clear the global variable map when all channels are redeployed
    pub clear_global_map: bool,
    /// How long a graceful stop waits for in-flight work before halting
    pub stop_timeout_ms: u64,
    pub event_channel_capacity: usize,
    pub alerts: AlertsConfig,
    pub retry: RetryDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            queue_buffer_size: constants::DEFAULT_QUEUE_BUFFER_SIZE,
            clear_global_map: true,
            stop_timeout_ms: constants::DEFAULT_STOP_TIMEOUT_MS,
            event_channel_capacity: constants::DEFAULT_EVENT_CHANNEL_CAPACITY,
            alerts: AlertsConfig::default(),
            retry: RetryDefaults::default(),
        }
    }
}

impl EngineConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "environment",
                "engine configuration",
            ));
        }

        if self.queue_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue_buffer_size",
                "0",
                "queue buffer size must be greater than 0",
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_channel_capacity",
                "0",
                "event channel capacity must be greater than 0",
            ));
        }

        if self.alerts.action_backlog_warning == 0 {
            return Err(ConfigurationError::invalid_value(
                "alerts.action_backlog_warning",
                "0",
                "action backlog warning must be greater than 0",
            ));
        }

        if self.retry.retry_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.retry_interval_ms",
                "0",
                "retry interval must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Pending actions above which a warning is logged; actions are never dropped
    pub action_backlog_warning: usize,
    /// Subject used when an alert action has none
    pub default_subject: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            action_backlog_warning: constants::DEFAULT_ACTION_BACKLOG_WARNING,
            default_subject: constants::DEFAULT_ALERT_SUBJECT.to_string(),
        }
    }
}

/// Queue retry defaults for destinations that do not set their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    pub retry_interval_ms: u64,
    /// 0 retries forever
    pub retry_count: u32,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            retry_interval_ms: constants::DEFAULT_RETRY_INTERVAL_MS,
            retry_count: constants::DEFAULT_RETRY_COUNT,
        }
    }
}
