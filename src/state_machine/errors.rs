use super::events::LifecycleEvent;
use super::states::ConnectorState;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition for {connector}: cannot {event} while {from}")]
    InvalidTransition {
        connector: String,
        from: ConnectorState,
        event: LifecycleEvent,
    },

    #[error("{connector} is already {state}")]
    AlreadyInState {
        connector: String,
        state: ConnectorState,
    },

    #[error("{connector} has not been deployed")]
    NotDeployed { connector: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
