use super::status::Status;
use serde::{Deserialize, Serialize};

/// Response produced by a destination transport (or selected for a source)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub data: String,
    pub status_message: String,
    pub error: String,
}

impl Response {
    pub fn new(
        status: Status,
        data: impl Into<String>,
        status_message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status,
            data: data.into(),
            status_message: status_message.into(),
            error: error.into(),
        }
    }

    pub fn sent(data: impl Into<String>) -> Self {
        Self::new(Status::Sent, data, "", "")
    }

    pub fn error(status_message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(Status::Error, "", status_message, error)
    }

    pub fn queued(status_message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(Status::Queued, "", status_message, error)
    }

    pub fn filtered(status_message: impl Into<String>) -> Self {
        Self::new(Status::Filtered, "", status_message, "")
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Sent
    }
}
