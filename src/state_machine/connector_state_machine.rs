use super::{
    errors::{StateMachineError, StateMachineResult},
    events::LifecycleEvent,
    states::{ConnectorActivity, ConnectorState},
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::debug;

/// Thread-safe lifecycle state machine for a channel or connector.
///
/// Transitions are validated and applied under a single write lock, so a
/// `halt` racing an in-flight `stop` always observes a consistent state.
#[derive(Debug)]
pub struct ConnectorStateMachine {
    name: String,
    state: RwLock<ConnectorState>,
    activity: AtomicU8,
    deployed: AtomicBool,
}

impl ConnectorStateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ConnectorState::Stopped),
            activity: AtomicU8::new(ConnectorActivity::Idle as u8),
            deployed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current lifecycle state
    pub fn current_state(&self) -> ConnectorState {
        *self.state.read()
    }

    pub fn is_deployed(&self) -> bool {
        self.deployed.load(Ordering::Acquire)
    }

    pub fn mark_deployed(&self) {
        self.deployed.store(true, Ordering::Release);
    }

    pub fn mark_undeployed(&self) {
        self.deployed.store(false, Ordering::Release);
    }

    /// Apply a lifecycle event, returning the new state
    pub fn transition(&self, event: LifecycleEvent) -> StateMachineResult<ConnectorState> {
        if event == LifecycleEvent::Start && !self.is_deployed() {
            return Err(StateMachineError::NotDeployed {
                connector: self.name.clone(),
            });
        }

        let mut state = self.state.write();
        let target = Self::determine_target_state(&self.name, *state, event)?;

        debug!(
            connector = %self.name,
            from = %*state,
            to = %target,
            event = event.event_type(),
            "state transition"
        );

        *state = target;
        Ok(target)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        name: &str,
        current_state: ConnectorState,
        event: LifecycleEvent,
    ) -> StateMachineResult<ConnectorState> {
        use ConnectorState as S;
        use LifecycleEvent as E;

        let target = match (current_state, event) {
            // Halt is always legal and wins over every other transition
            (_, E::Halt) => S::Halting,
            (S::Halting, E::HaltCompleted) => S::Stopped,

            (S::Stopped, E::Start) => S::Starting,
            (S::Starting, E::StartCompleted) => S::Started,
            (S::Starting, E::StartFailed) => S::Stopped,

            (S::Started | S::Paused, E::Stop) => S::Stopping,
            (S::Stopping, E::StopCompleted) => S::Stopped,

            (S::Started, E::Pause) => S::Pausing,
            (S::Pausing, E::PauseCompleted) => S::Paused,
            (S::Pausing, E::PauseFailed) => S::Started,
            (S::Paused, E::Resume) => S::Started,

            (S::Started, E::Start | E::Resume)
            | (S::Stopped, E::Stop)
            | (S::Paused, E::Pause) => {
                return Err(StateMachineError::AlreadyInState {
                    connector: name.to_string(),
                    state: current_state,
                })
            }

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    connector: name.to_string(),
                    from,
                    event,
                })
            }
        };

        Ok(target)
    }

    /// Current advisory activity
    pub fn activity(&self) -> ConnectorActivity {
        ConnectorActivity::from(self.activity.load(Ordering::Acquire))
    }

    /// Record a new activity, returning the previous one
    pub fn set_activity(&self, activity: ConnectorActivity) -> ConnectorActivity {
        ConnectorActivity::from(self.activity.swap(activity as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed(name: &str) -> ConnectorStateMachine {
        let sm = ConnectorStateMachine::new(name);
        sm.mark_deployed();
        sm
    }

    #[test]
    fn test_start_stop_cycle() {
        let sm = deployed("Source");
        assert_eq!(sm.current_state(), ConnectorState::Stopped);

        assert_eq!(
            sm.transition(LifecycleEvent::Start).unwrap(),
            ConnectorState::Starting
        );
        assert_eq!(
            sm.transition(LifecycleEvent::StartCompleted).unwrap(),
            ConnectorState::Started
        );
        assert_eq!(
            sm.transition(LifecycleEvent::Stop).unwrap(),
            ConnectorState::Stopping
        );
        assert_eq!(
            sm.transition(LifecycleEvent::StopCompleted).unwrap(),
            ConnectorState::Stopped
        );
    }

    #[test]
    fn test_start_requires_deploy() {
        let sm = ConnectorStateMachine::new("Destination 1");
        let err = sm.transition(LifecycleEvent::Start).unwrap_err();
        assert!(matches!(err, StateMachineError::NotDeployed { .. }));
        assert_eq!(sm.current_state(), ConnectorState::Stopped);
    }

    #[test]
    fn test_start_on_started_is_error() {
        let sm = deployed("Source");
        sm.transition(LifecycleEvent::Start).unwrap();
        sm.transition(LifecycleEvent::StartCompleted).unwrap();

        let err = sm.transition(LifecycleEvent::Start).unwrap_err();
        assert!(matches!(err, StateMachineError::AlreadyInState { .. }));
        assert_eq!(sm.current_state(), ConnectorState::Started);
    }

    #[test]
    fn test_failed_start_returns_to_stopped() {
        let sm = deployed("Source");
        sm.transition(LifecycleEvent::Start).unwrap();
        assert_eq!(
            sm.transition(LifecycleEvent::StartFailed).unwrap(),
            ConnectorState::Stopped
        );
    }

    #[test]
    fn test_pause_resume() {
        let sm = deployed("Source");
        sm.transition(LifecycleEvent::Start).unwrap();
        sm.transition(LifecycleEvent::StartCompleted).unwrap();
        sm.transition(LifecycleEvent::Pause).unwrap();
        assert_eq!(
            sm.transition(LifecycleEvent::PauseCompleted).unwrap(),
            ConnectorState::Paused
        );
        assert_eq!(
            sm.transition(LifecycleEvent::Resume).unwrap(),
            ConnectorState::Started
        );
    }

    #[test]
    fn test_halt_is_legal_from_every_state() {
        for state in [
            ConnectorState::Stopped,
            ConnectorState::Starting,
            ConnectorState::Started,
            ConnectorState::Pausing,
            ConnectorState::Paused,
            ConnectorState::Stopping,
            ConnectorState::Halting,
        ] {
            assert_eq!(
                ConnectorStateMachine::determine_target_state("c", state, LifecycleEvent::Halt)
                    .unwrap(),
                ConnectorState::Halting
            );
        }
    }

    #[test]
    fn test_stop_completion_after_halt_is_rejected() {
        let sm = deployed("Source");
        sm.transition(LifecycleEvent::Start).unwrap();
        sm.transition(LifecycleEvent::StartCompleted).unwrap();
        sm.transition(LifecycleEvent::Stop).unwrap();

        // halt overtakes the in-flight stop
        sm.transition(LifecycleEvent::Halt).unwrap();
        assert!(sm.transition(LifecycleEvent::StopCompleted).is_err());
        assert_eq!(
            sm.transition(LifecycleEvent::HaltCompleted).unwrap(),
            ConnectorState::Stopped
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(ConnectorStateMachine::determine_target_state(
            "c",
            ConnectorState::Stopped,
            LifecycleEvent::Pause
        )
        .is_err());
        assert!(ConnectorStateMachine::determine_target_state(
            "c",
            ConnectorState::Starting,
            LifecycleEvent::Stop
        )
        .is_err());
    }

    #[test]
    fn test_activity_does_not_affect_state() {
        let sm = deployed("Destination 1");
        assert_eq!(
            sm.set_activity(ConnectorActivity::Sending),
            ConnectorActivity::Idle
        );
        assert_eq!(sm.activity(), ConnectorActivity::Sending);
        assert_eq!(sm.current_state(), ConnectorState::Stopped);
    }
}
