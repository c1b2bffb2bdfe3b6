//! # Connectors
//!
//! A channel owns one source connector and any number of destination
//! connectors. Each connector wraps a pluggable transport with the engine's
//! lifecycle state machine, its pipeline stages and, for destinations, an
//! optional retry queue.

pub mod destination;
pub mod registry;
pub mod source;
pub mod transport;

pub use destination::{DestinationConnector, QueuePolicy};
pub use registry::{ConnectorRegistry, DestinationFactory, SourceFactory};
pub use source::{DispatchGuard, DispatchTracker, SourceConnector};
pub use transport::{
    ConnectorLifecycle, DestinationTransport, SourceTransport, TransportError, TransportResult,
};
