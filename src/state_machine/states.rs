use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states shared by channels and connectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorState {
    /// Deployed (or not yet deployed) and idle
    Stopped,
    /// Start in progress
    Starting,
    /// Running and accepting work
    Started,
    /// Pause in progress
    Pausing,
    /// Source suspended, destinations still draining
    Paused,
    /// Graceful stop in progress
    Stopping,
    /// Forced stop in progress
    Halting,
}

impl ConnectorState {
    /// States in which a channel accepts non-forced dispatches
    pub fn is_accepting(&self) -> bool {
        matches!(self, Self::Started | Self::Starting)
    }

    /// Transitional states that resolve on their own
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Pausing | Self::Stopping | Self::Halting
        )
    }

    /// Whether a graceful stop has anything to do from this state
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Started | Self::Paused | Self::Pausing)
    }
}

impl Default for ConnectorState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Started => write!(f, "STARTED"),
            Self::Pausing => write!(f, "PAUSING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Halting => write!(f, "HALTING"),
        }
    }
}

impl std::str::FromStr for ConnectorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STOPPED" => Ok(Self::Stopped),
            "STARTING" => Ok(Self::Starting),
            "STARTED" => Ok(Self::Started),
            "PAUSING" => Ok(Self::Pausing),
            "PAUSED" => Ok(Self::Paused),
            "STOPPING" => Ok(Self::Stopping),
            "HALTING" => Ok(Self::Halting),
            _ => Err(format!("Invalid connector state: {s}")),
        }
    }
}

/// Advisory per-operation activity reported to dashboards.
///
/// Activity never gates a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ConnectorActivity {
    Idle = 0,
    Polling = 1,
    Reading = 2,
    Writing = 3,
    Sending = 4,
    Receiving = 5,
}

impl From<u8> for ConnectorActivity {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Polling,
            2 => Self::Reading,
            3 => Self::Writing,
            4 => Self::Sending,
            5 => Self::Receiving,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for ConnectorActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Polling => write!(f, "POLLING"),
            Self::Reading => write!(f, "READING"),
            Self::Writing => write!(f, "WRITING"),
            Self::Sending => write!(f, "SENDING"),
            Self::Receiving => write!(f, "RECEIVING"),
        }
    }
}

/// State a channel is put into right after deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitialState {
    #[default]
    Started,
    Paused,
    Stopped,
}
