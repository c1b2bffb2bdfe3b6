//! # Engine
//!
//! The engine controller owns every deployed channel and is the single entry
//! point for deploy, lifecycle, dispatch and status calls.

pub mod bootstrap;
pub mod context;
pub mod controller;
pub mod global_map;
pub mod repository;
pub mod status;

pub use bootstrap::EngineBootstrap;
pub use context::{EngineContext, EngineContextBuilder};
pub use controller::EngineController;
pub use global_map::GlobalMap;
pub use repository::{ChannelRepository, InMemoryChannelRepository};
pub use status::{DashboardStatus, StatusType};
