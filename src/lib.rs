#![allow(clippy::doc_markdown)] // Allow technical terms like HL7, MLLP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core
//!
//! Channel engine for healthcare-style integration pipelines.
//!
//! ## Overview
//!
//! A **channel** receives raw messages on one source connector, runs them
//! through a filter and transformer, and fans them out to destination
//! connectors organized in ordered chains. Transports and script evaluation
//! are plugged in from outside; this crate owns the lifecycle, the pipeline
//! and the bookkeeping around them.
//!
//! ## Architecture
//!
//! - **Connector state machine**: one lifecycle model shared by channels,
//!   sources and destinations, with advisory activity substates
//! - **Bounded queues**: blocking or rotating backpressure in front of every
//!   queue-enabled connector, with retry on failed sends
//! - **Dispatch pipeline**: filter and transformer per connector, with the
//!   no-op short circuit preserving raw bytes exactly
//! - **Destination chains**: ordered within a chain, concurrent across chains
//! - **Engine controller**: deploy, lifecycle, dispatch and dashboard status
//!   with per-channel failure isolation
//! - **Alerts**: error events matched against alert definitions, with actions
//!   executed serially and suppressed when the alert changed in the meantime
//!
//! ## Module Organization
//!
//! - [`engine`] - Engine controller, context, repository and bootstrap
//! - [`channel`] - Deployed channel runtime, chains and response selection
//! - [`connector`] - Source and destination connectors plus transport seams
//! - [`pipeline`] - Filter/transformer executors and data types
//! - [`queue`] - Bounded message queue
//! - [`state_machine`] - Lifecycle states and transitions
//! - [`events`] - Error, connection status and server events
//! - [`alert`] - Alert definitions, workers and action execution
//! - [`storage`] - Message storage modes and the message store
//! - [`config`] - Engine configuration and channel definitions
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_core::config::EngineConfig;
//! use courier_core::engine::EngineBootstrap;
//! use courier_core::message::RawMessage;
//!
//! # async fn example() -> courier_core::error::Result<()> {
//! let bootstrap = EngineBootstrap::from_config(EngineConfig::default(), |builder| builder)?;
//! bootstrap.start_engine(Vec::new()).await?;
//!
//! let result = bootstrap
//!     .engine()
//!     .dispatch_raw_message("adt-inbound", RawMessage::new("MSH|^~\\&|..."), false)
//!     .await?;
//! println!("selected response: {:?}", result.selected_response);
//!
//! bootstrap.stop_engine().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod alert;
pub mod channel;
pub mod config;
pub mod connector;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod message;
pub mod pipeline;
pub mod queue;
pub mod state_machine;
pub mod statistics;
pub mod storage;

pub mod test_helpers;

pub use alert::{AlertController, AlertModel};
pub use channel::Channel;
pub use config::{ChannelConfig, ConfigManager, ConnectorConfig, EngineConfig};
pub use connector::{DestinationTransport, SourceTransport, TransportError};
pub use engine::{DashboardStatus, EngineBootstrap, EngineContext, EngineController};
pub use error::{EngineError, Result};
pub use events::{ErrorEvent, ErrorEventType, Event, EventDispatcher};
pub use message::{ConnectorMessage, DispatchResult, RawMessage, Response, Status};
pub use pipeline::ScriptEvaluator;
pub use state_machine::{ConnectorState, InitialState};
