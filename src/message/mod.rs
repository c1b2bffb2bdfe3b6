//! # Message Model
//!
//! Messages, per-connector messages, transport responses and dispatch results.

pub mod connector_message;
pub mod dispatch;
pub mod response;
pub mod status;

pub use connector_message::{ConnectorMessage, MessageContent, MessageMap};
pub use dispatch::{DispatchResult, Message, RawMessage};
pub use response::Response;
pub use status::{InvalidStatusTransition, Status};
