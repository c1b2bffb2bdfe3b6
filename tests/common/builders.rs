//! Channel definition builders used across the integration tests

use courier_core::config::{
    ChannelConfig, ConnectorConfig, FilterConfig, QueueConfig, ResponseSelection,
    TransformerConfig,
};
use courier_core::InitialState;

pub const PUSH: &str = "push";
pub const CAPTURE: &str = "capture";

/// Channel with a push source and no destinations
pub fn channel(id: &str) -> ChannelConfig {
    ChannelConfig::new(id, format!("{id} channel"), ConnectorConfig::new("Source", PUSH))
}

pub fn channel_with_source(id: &str, transport_type: &str) -> ChannelConfig {
    ChannelConfig::new(
        id,
        format!("{id} channel"),
        ConnectorConfig::new("Source", transport_type),
    )
}

pub fn destination(name: &str, transport_type: &str) -> ConnectorConfig {
    ConnectorConfig::new(name, transport_type)
}

pub fn queued_destination(name: &str, transport_type: &str, queue: QueueConfig) -> ConnectorConfig {
    ConnectorConfig::new(name, transport_type).with_queue(queue)
}

pub fn with_initial_state(mut channel: ChannelConfig, state: InitialState) -> ChannelConfig {
    channel.properties.initial_state = state;
    channel
}

pub fn with_response(mut channel: ChannelConfig, respond_from: ResponseSelection) -> ChannelConfig {
    channel.source.response.respond_from = respond_from;
    channel
}

/// Acknowledge on receipt and process from the source queue
pub fn acknowledge_on_receipt(mut channel: ChannelConfig) -> ChannelConfig {
    channel.source.response.respond_after_processing = false;
    channel
}

pub fn source_filter(mut channel: ChannelConfig, rule: &str) -> ChannelConfig {
    channel.source.filter = FilterConfig::default().with_rule("rule", rule);
    channel
}

pub fn source_steps(mut channel: ChannelConfig, steps: &[&str]) -> ChannelConfig {
    let mut transformer = TransformerConfig::default();
    for (index, step) in steps.iter().enumerate() {
        transformer = transformer.with_step(format!("step {}", index + 1), *step);
    }
    channel.source.transformer = transformer;
    channel
}

pub fn steps(steps: &[&str]) -> TransformerConfig {
    steps
        .iter()
        .enumerate()
        .fold(TransformerConfig::default(), |transformer, (index, step)| {
            transformer.with_step(format!("step {}", index + 1), *step)
        })
}
