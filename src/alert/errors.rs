use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    #[error("No alert worker handles trigger type '{trigger_type}' (alert {alert_id})")]
    WorkerNotFound {
        alert_id: String,
        trigger_type: String,
    },

    #[error("Alert not found: {alert_id}")]
    AlertNotFound { alert_id: String },

    #[error("Invalid alert {alert_id}: {reason}")]
    InvalidAlert { alert_id: String, reason: String },

    #[error("Alert action executor is shut down")]
    ExecutorClosed,

    #[error("Failed to send alert e-mail to {recipients}: {reason}")]
    Email { recipients: String, reason: String },
}

impl AlertError {
    pub fn invalid_alert(alert_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidAlert {
            alert_id: alert_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn email(recipients: &[String], reason: impl std::fmt::Display) -> Self {
        Self::Email {
            recipients: recipients.join(","),
            reason: reason.to_string(),
        }
    }
}

pub type AlertResult<T> = Result<T, AlertError>;
