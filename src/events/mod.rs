//! # Engine Events
//!
//! Connection status, error and server events, and the publish/subscribe
//! dispatcher that fans them out to listeners such as alert workers.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{EventDispatcher, EventListener};
pub use types::{
    ConnectionStatus, ConnectionStatusEvent, ErrorEvent, ErrorEventType, Event, EventLevel,
    ServerEvent,
};
