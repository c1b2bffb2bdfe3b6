//! # Alert Controller
//!
//! Keeps the alert definitions and hands each one to the worker registered
//! for its trigger type. Workers are registered as event listeners.

use super::action::{ActionRunner, EmailSender, MessageRouter};
use super::default_worker::DefaultAlertWorker;
use super::errors::{AlertError, AlertResult};
use super::model::{AlertModel, AlertStatus};
use super::worker::AlertWorker;
use crate::config::AlertsConfig;
use crate::events::{EventDispatcher, EventListener};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct AlertController {
    workers: DashMap<String, Arc<dyn AlertWorker>>,
    alerts: DashMap<String, AlertModel>,
    events: Arc<EventDispatcher>,
    runner: Arc<ActionRunner>,
    action_backlog_warning: usize,
}

impl std::fmt::Debug for dyn AlertWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertWorker")
            .field("trigger_type", &self.trigger_type())
            .finish()
    }
}

impl AlertController {
    /// Create the controller with the default error worker registered.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(events: Arc<EventDispatcher>, config: &AlertsConfig) -> Self {
        let runner = Arc::new(ActionRunner::new(
            Arc::clone(&events),
            config.default_subject.clone(),
        ));
        let controller = Self {
            workers: DashMap::new(),
            alerts: DashMap::new(),
            events,
            runner,
            action_backlog_warning: config.action_backlog_warning,
        };
        controller.register_worker(Arc::new(DefaultAlertWorker::new(
            Arc::clone(&controller.runner),
            controller.action_backlog_warning,
        )));
        controller
    }

    /// Register a worker for its trigger type, replacing any previous one
    pub fn register_worker<W>(&self, worker: Arc<W>)
    where
        W: AlertWorker + 'static,
    {
        let trigger_type = worker.trigger_type().to_string();
        self.events
            .add_listener(Arc::clone(&worker) as Arc<dyn EventListener>);
        if let Some(previous) = self.workers.insert(trigger_type.clone(), worker) {
            previous.shutdown();
        }
        info!(trigger_type = %trigger_type, "ALERT: Registered worker");
    }

    pub fn runner(&self) -> &Arc<ActionRunner> {
        &self.runner
    }

    pub fn action_backlog_warning(&self) -> usize {
        self.action_backlog_warning
    }

    pub fn set_email_sender(&self, sender: Arc<dyn EmailSender>) {
        self.runner.set_email_sender(sender);
    }

    pub fn set_router(&self, router: &Arc<dyn MessageRouter>) {
        self.runner.set_router(router);
    }

    /// Store every model and enable the enabled ones.
    ///
    /// One failing alert does not keep the others from being enabled; the
    /// first error is returned.
    pub fn init_alerts(&self, models: Vec<AlertModel>) -> AlertResult<()> {
        let mut first_error = None;
        for model in models {
            if model.enabled {
                if let Err(e) = self.enable_alert(model) {
                    error!(error = %e, "ALERT: Failed to enable alert");
                    first_error.get_or_insert(e);
                }
            } else {
                self.alerts.insert(model.id.clone(), model);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Enable an alert on the worker for its trigger type.
    ///
    /// Without a matching worker the alert is stored disabled.
    pub fn enable_alert(&self, mut model: AlertModel) -> AlertResult<()> {
        let trigger_type = model.trigger.trigger_type().to_string();
        let worker = self.workers.get(&trigger_type).map(|w| Arc::clone(w.value()));

        let Some(worker) = worker else {
            warn!(alert_id = %model.id, trigger_type = %trigger_type, "ALERT: No worker for trigger type");
            let alert_id = model.id.clone();
            model.enabled = false;
            self.alerts.insert(alert_id.clone(), model);
            return Err(AlertError::WorkerNotFound {
                alert_id,
                trigger_type,
            });
        };

        model.enabled = true;
        if let Err(e) = worker.enable_alert(model.clone()) {
            model.enabled = false;
            self.alerts.insert(model.id.clone(), model);
            return Err(e);
        }
        self.alerts.insert(model.id.clone(), model);
        Ok(())
    }

    /// Disable an alert on every worker
    pub fn disable_alert(&self, alert_id: &str) {
        for worker in self.workers.iter() {
            worker.disable_alert(alert_id);
        }
        if let Some(mut model) = self.alerts.get_mut(alert_id) {
            model.enabled = false;
        }
    }

    /// Replace a definition; an enabled alert restarts with a fresh activation time
    pub fn update_alert(&self, model: AlertModel) -> AlertResult<()> {
        self.disable_alert(&model.id);
        if model.enabled {
            self.enable_alert(model)
        } else {
            self.alerts.insert(model.id.clone(), model);
            Ok(())
        }
    }

    pub fn remove_alert(&self, alert_id: &str) -> AlertResult<AlertModel> {
        self.disable_alert(alert_id);
        self.alerts
            .remove(alert_id)
            .map(|(_, model)| model)
            .ok_or_else(|| AlertError::AlertNotFound {
                alert_id: alert_id.to_string(),
            })
    }

    pub fn alert(&self, alert_id: &str) -> Option<AlertModel> {
        self.alerts.get(alert_id).map(|m| m.clone())
    }

    pub fn is_enabled(&self, alert_id: &str) -> bool {
        self.workers
            .iter()
            .any(|w| w.enabled_alert(alert_id).is_some())
    }

    /// Times the alert fired since it was last enabled
    pub fn alerted_count(&self, alert_id: &str) -> u64 {
        self.workers
            .iter()
            .filter_map(|w| w.alerted_count(alert_id))
            .sum()
    }

    pub fn alert_status_list(&self) -> Vec<AlertStatus> {
        let mut statuses: Vec<AlertStatus> = self
            .alerts
            .iter()
            .map(|model| AlertStatus {
                id: model.id.clone(),
                name: model.name.clone(),
                enabled: self.is_enabled(&model.id),
                alerted_count: self.alerted_count(&model.id),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        statuses
    }

    pub fn trigger_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        types.sort();
        types
    }

    /// Unregister the workers and stop their executors
    pub fn shutdown(&self) {
        for worker in self.workers.iter() {
            self.events.remove_listener(worker.name());
            worker.shutdown();
        }
        info!("ALERT: Alert controller shut down");
    }
}
