use serde::{Deserialize, Serialize};

/// Events that drive connector and channel lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Begin starting
    Start,
    /// Start finished successfully
    StartCompleted,
    /// Start failed, roll back to stopped
    StartFailed,
    /// Begin a graceful stop
    Stop,
    /// Graceful stop finished
    StopCompleted,
    /// Begin pausing
    Pause,
    /// Pause finished
    PauseCompleted,
    /// Pause failed, keep running
    PauseFailed,
    /// Resume from paused
    Resume,
    /// Forced stop, legal from any state
    Halt,
    /// Forced stop finished
    HaltCompleted,
}

impl LifecycleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::StartCompleted => "start_completed",
            Self::StartFailed => "start_failed",
            Self::Stop => "stop",
            Self::StopCompleted => "stop_completed",
            Self::Pause => "pause",
            Self::PauseCompleted => "pause_completed",
            Self::PauseFailed => "pause_failed",
            Self::Resume => "resume",
            Self::Halt => "halt",
            Self::HaltCompleted => "halt_completed",
        }
    }

    /// Completion events close a transitional state
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            Self::StartCompleted
                | Self::StartFailed
                | Self::StopCompleted
                | Self::PauseCompleted
                | Self::PauseFailed
                | Self::HaltCompleted
        )
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_type())
    }
}
