use crate::connector::DestinationConnector;
use crate::message::ConnectorMessage;
use std::sync::Arc;
use tracing::trace;

/// Ordered destinations that share one source message.
///
/// Each destination only sees the message once the previous one holds a
/// status the chain can move past, and inherits that destination's channel
/// and response maps.
#[derive(Debug, Default)]
pub struct DestinationChain {
    destinations: Vec<Arc<DestinationConnector>>,
}

impl DestinationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, destination: Arc<DestinationConnector>) {
        self.destinations.push(destination);
    }

    pub fn destinations(&self) -> &[Arc<DestinationConnector>] {
        &self.destinations
    }

    pub fn metadata_ids(&self) -> Vec<u32> {
        self.destinations.iter().map(|d| d.metadata_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Run every targeted destination in order for one accepted source message
    pub async fn process(
        &self,
        source: &ConnectorMessage,
        targets: Option<&[u32]>,
    ) -> Vec<ConnectorMessage> {
        let mut results: Vec<ConnectorMessage> = Vec::with_capacity(self.destinations.len());

        for destination in &self.destinations {
            let metadata_id = destination.metadata_id();
            if targets.is_some_and(|ids| !ids.contains(&metadata_id)) {
                trace!(metadata_id, "CHANNEL: Destination not targeted, skipping");
                continue;
            }

            let mut message =
                ConnectorMessage::for_destination(source, metadata_id, destination.name());
            if let Some(previous) = results.last() {
                message.channel_map = previous.channel_map.clone();
                message.response_map = previous.response_map.clone();
            }

            results.push(destination.process(message).await);
        }

        results
    }
}
