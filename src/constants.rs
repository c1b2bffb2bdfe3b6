//! # Engine Constants
//!
//! Defaults and well-known names shared across the channel engine.

/// Metadata id reserved for the source connector of every channel
pub const SOURCE_METADATA_ID: u32 = 0;

/// Display name used for the source connector in dashboards and events
pub const SOURCE_CONNECTOR_NAME: &str = "Source";

/// Default in-memory read-ahead capacity of a connector queue
pub const DEFAULT_QUEUE_BUFFER_SIZE: usize = 1000;

/// Default delay between retries of a queued destination
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 10_000;

/// Default retry limit for queued destinations (0 retries forever)
pub const DEFAULT_RETRY_COUNT: u32 = 0;

/// Default time a stop waits for in-flight work before giving up
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 30_000;

/// Default capacity of the broadcast channel behind the event dispatcher
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Pending alert actions above which the executor logs a warning
pub const DEFAULT_ACTION_BACKLOG_WARNING: usize = 1000;

/// Subject used for alert e-mails when the action group leaves it blank
pub const DEFAULT_ALERT_SUBJECT: &str = "Courier Alert";

/// Name of the server event emitted after an alert action has run
pub const ALERT_DISPATCHED_EVENT: &str = "Alert Dispatched";

/// Built-in data type names
pub mod data_types {
    pub const RAW: &str = "RAW";
    pub const XML: &str = "XML";
    pub const JSON: &str = "JSON";
}

/// Keys placed into the alert context map
pub mod alert_context {
    pub const ALERT_ID: &str = "alertId";
    pub const ALERT_NAME: &str = "alertName";
    pub const CHANNEL_ID: &str = "channelId";
    pub const CONNECTOR_NAME: &str = "connectorName";
    pub const METADATA_ID: &str = "metaDataId";
    pub const EVENT_TYPE: &str = "eventType";
    pub const ERROR: &str = "error";
    pub const ERROR_MESSAGE: &str = "errorMessage";
    pub const SYSTEM_TIME: &str = "systemTime";
}

/// Prefix used for destination entries in the destination name map (`d1`, `d2`, ...)
pub fn destination_key(metadata_id: u32) -> String {
    format!("d{metadata_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_key() {
        assert_eq!(destination_key(1), "d1");
        assert_eq!(destination_key(12), "d12");
    }
}
