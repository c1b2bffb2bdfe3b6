//! # Message Queues
//!
//! Bounded per-connector queues with blocking or rotating overflow.

pub mod message_queue;

pub use message_queue::{MessageQueue, OverflowPolicy, QueueClosed, TryPushError};
