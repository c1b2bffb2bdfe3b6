//! # Alerts
//!
//! Alert workers listen to engine events, match them against enabled alerts
//! and schedule the alert's action groups on a serial executor.

pub mod action;
pub mod controller;
pub mod default_worker;
pub mod errors;
pub mod model;
pub mod template;
pub mod worker;

pub use action::{ActionExecutor, ActionRunner, ActionTask, EmailSender, EnabledAlerts, MessageRouter};
pub use controller::AlertController;
pub use default_worker::DefaultAlertWorker;
pub use errors::{AlertError, AlertResult};
pub use model::{
    ActionGroup, AlertAction, AlertChannels, AlertModel, AlertProtocol, AlertStatus, AlertTrigger,
    ErrorTrigger, ERROR_TRIGGER_TYPE,
};
pub use template::replace_values;
pub use worker::{Alert, AlertWorker, AlertWorkerCore};
