//! # Channels
//!
//! A channel combines one source connector with ordered destination chains.
//! It owns the per-channel tasks (poll loop, source queue consumer, destination
//! queue consumers) and the lifecycle that drives them.

pub mod builder;
pub mod chain;
pub mod response_selector;
pub mod runtime;
pub mod services;

pub use builder::{assign_metadata_ids, build_channel, destination_name_map};
pub use chain::DestinationChain;
pub use response_selector::ResponseSelector;
pub use runtime::{Channel, SourceQueueItem};
pub use services::ChannelServices;
