// Lifecycle state machine shared by channels and connectors.
//
// Lifecycle states gate deploy/start/stop/pause/halt; activity substates are
// advisory and only feed dashboards and connection status events.

pub mod connector_state_machine;
pub mod errors;
pub mod events;
pub mod states;

pub use connector_state_machine::ConnectorStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::LifecycleEvent;
pub use states::{ConnectorActivity, ConnectorState, InitialState};
