use crate::channel::Channel;
use crate::constants::{SOURCE_CONNECTOR_NAME, SOURCE_METADATA_ID};
use crate::state_machine::{ConnectorActivity, ConnectorState};
use crate::statistics::{StatisticsRegistry, StatisticsSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    Channel,
    SourceConnector,
    DestinationConnector,
}

/// Point-in-time dashboard row; channels carry one child per connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatus {
    pub channel_id: String,
    pub name: String,
    pub status_type: StatusType,
    pub metadata_id: Option<u32>,
    pub state: ConnectorState,
    pub activity: Option<ConnectorActivity>,
    pub tags: Vec<String>,
    pub deployed_at: Option<DateTime<Utc>>,
    /// Stored revision minus deployed revision; non-zero means the deployment is stale
    pub deployed_revision_delta: i64,
    pub queue_enabled: bool,
    pub queued: usize,
    pub statistics: StatisticsSnapshot,
    pub lifetime_statistics: StatisticsSnapshot,
    pub children: Vec<DashboardStatus>,
}

impl DashboardStatus {
    pub fn from_channel(
        channel: &Channel,
        stored_revision: Option<u32>,
        statistics: &StatisticsRegistry,
    ) -> Self {
        let id = channel.id();
        let source = channel.source();

        let mut children = Vec::with_capacity(channel.destinations().count() + 1);
        children.push(Self::connector(
            channel,
            StatusType::SourceConnector,
            SOURCE_METADATA_ID,
            SOURCE_CONNECTOR_NAME,
            source.current_state(),
            source.activity(),
            source.queue_enabled(),
            channel.source_queue_len(),
            statistics,
        ));
        for destination in channel.destinations() {
            children.push(Self::connector(
                channel,
                StatusType::DestinationConnector,
                destination.metadata_id(),
                destination.name(),
                destination.current_state(),
                destination.activity(),
                destination.queue_enabled(),
                destination.queued_count(),
                statistics,
            ));
        }

        Self {
            channel_id: id.to_string(),
            name: channel.name().to_string(),
            status_type: StatusType::Channel,
            metadata_id: None,
            state: channel.current_state(),
            activity: None,
            tags: channel.tags().to_vec(),
            deployed_at: Some(channel.deployed_at()),
            deployed_revision_delta: stored_revision
                .map_or(0, |r| i64::from(r) - i64::from(channel.revision())),
            queue_enabled: children.iter().any(|c| c.queue_enabled),
            queued: children.iter().map(|c| c.queued).sum(),
            statistics: statistics.current().channel(id),
            lifetime_statistics: statistics.lifetime().channel(id),
            children,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn connector(
        channel: &Channel,
        status_type: StatusType,
        metadata_id: u32,
        name: &str,
        state: ConnectorState,
        activity: ConnectorActivity,
        queue_enabled: bool,
        queued: usize,
        statistics: &StatisticsRegistry,
    ) -> Self {
        Self {
            channel_id: channel.id().to_string(),
            name: name.to_string(),
            status_type,
            metadata_id: Some(metadata_id),
            state,
            activity: Some(activity),
            tags: Vec::new(),
            deployed_at: None,
            deployed_revision_delta: 0,
            queue_enabled,
            queued,
            statistics: statistics.current().connector(channel.id(), metadata_id),
            lifetime_statistics: statistics.lifetime().connector(channel.id(), metadata_id),
            children: Vec::new(),
        }
    }

    pub fn child(&self, metadata_id: u32) -> Option<&DashboardStatus> {
        self.children
            .iter()
            .find(|c| c.metadata_id == Some(metadata_id))
    }
}
