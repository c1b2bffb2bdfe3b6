use super::action::{ActionExecutor, ActionRunner, ActionTask, EnabledAlerts};
use super::errors::AlertResult;
use super::model::AlertModel;
use crate::events::EventListener;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// An enabled alert
#[derive(Debug)]
pub struct Alert {
    pub model: AlertModel,
    /// When this incarnation of the alert became active
    pub enabled_at: Instant,
    alerted_count: AtomicU64,
}

impl Alert {
    pub fn new(model: AlertModel) -> Self {
        Self {
            model,
            enabled_at: Instant::now(),
            alerted_count: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.model.id
    }

    pub fn alerted_count(&self) -> u64 {
        self.alerted_count.load(Ordering::SeqCst)
    }

    pub fn increment_alerted_count(&self) -> u64 {
        self.alerted_count.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Event listener that owns the alerts of one trigger type
pub trait AlertWorker: EventListener {
    fn trigger_type(&self) -> &str;

    fn enable_alert(&self, model: AlertModel) -> AlertResult<()>;

    /// Returns whether the alert was enabled on this worker
    fn disable_alert(&self, alert_id: &str) -> bool;

    fn enabled_alert(&self, alert_id: &str) -> Option<Arc<Alert>>;

    fn alerted_count(&self, alert_id: &str) -> Option<u64> {
        self.enabled_alert(alert_id).map(|a| a.alerted_count())
    }

    fn shutdown(&self) {}
}

/// Enabled-alert bookkeeping and action scheduling shared by worker types
#[derive(Debug)]
pub struct AlertWorkerCore {
    enabled: EnabledAlerts,
    executor: ActionExecutor,
}

impl AlertWorkerCore {
    /// Must be called inside a tokio runtime
    pub fn new(runner: Arc<ActionRunner>, action_backlog_warning: usize) -> Self {
        Self {
            enabled: EnabledAlerts::default(),
            executor: ActionExecutor::spawn(action_backlog_warning, runner),
        }
    }

    /// Enable (or re-enable) an alert; re-enabling resets its activation time
    pub fn enable(&self, model: AlertModel) -> Arc<Alert> {
        let alert = Arc::new(Alert::new(model));
        self.enabled
            .insert(alert.id().to_string(), Arc::clone(&alert));
        info!(alert_id = %alert.id(), name = %alert.model.name, "ALERT: Enabled");
        alert
    }

    pub fn disable(&self, alert_id: &str) -> Option<Arc<Alert>> {
        let removed = self.enabled.remove(alert_id).map(|(_, alert)| alert);
        if removed.is_some() {
            info!(alert_id, "ALERT: Disabled");
        }
        removed
    }

    pub fn get(&self, alert_id: &str) -> Option<Arc<Alert>> {
        self.enabled.get(alert_id).map(|a| Arc::clone(a.value()))
    }

    pub fn alerts(&self) -> Vec<Arc<Alert>> {
        self.enabled.iter().map(|a| Arc::clone(a.value())).collect()
    }

    /// Count the alert and schedule one task per action group
    pub fn trigger(&self, alert: &Alert, context: HashMap<String, String>) {
        let count = alert.increment_alerted_count();
        debug!(alert_id = %alert.id(), count, "ALERT: Triggered");

        for group in &alert.model.action_groups {
            let task = ActionTask::new(
                alert.id(),
                group.clone(),
                context.clone(),
                Arc::clone(&self.enabled),
            );
            if let Err(e) = self.executor.submit(task) {
                debug!(alert_id = %alert.id(), error = %e, "ALERT: Action not scheduled");
            }
        }
    }

    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}
