use super::action::ActionRunner;
use super::errors::{AlertError, AlertResult};
use super::model::{AlertModel, AlertTrigger, ERROR_TRIGGER_TYPE};
use super::worker::{Alert, AlertWorker, AlertWorkerCore};
use crate::constants::alert_context;
use crate::events::{ErrorEvent, Event, EventListener};
use chrono::Utc;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Worker for error-event alerts
#[derive(Debug)]
pub struct DefaultAlertWorker {
    core: AlertWorkerCore,
    patterns: DashMap<String, Regex>,
}

impl DefaultAlertWorker {
    pub fn new(runner: Arc<ActionRunner>, action_backlog_warning: usize) -> Self {
        Self {
            core: AlertWorkerCore::new(runner, action_backlog_warning),
            patterns: DashMap::new(),
        }
    }

    fn build_context(alert: &Alert, event: &ErrorEvent) -> HashMap<String, String> {
        let mut context = HashMap::from([
            (alert_context::ALERT_ID.to_string(), alert.model.id.clone()),
            (alert_context::ALERT_NAME.to_string(), alert.model.name.clone()),
            (alert_context::EVENT_TYPE.to_string(), event.event_type.to_string()),
            (alert_context::ERROR.to_string(), event.formatted_message()),
            (alert_context::ERROR_MESSAGE.to_string(), event.message.clone()),
            (alert_context::SYSTEM_TIME.to_string(), Utc::now().to_rfc3339()),
        ]);
        if let Some(channel_id) = &event.channel_id {
            context.insert(alert_context::CHANNEL_ID.to_string(), channel_id.clone());
        }
        if let Some(name) = &event.connector_name {
            context.insert(alert_context::CONNECTOR_NAME.to_string(), name.clone());
        }
        if let Some(metadata_id) = event.metadata_id {
            context.insert(alert_context::METADATA_ID.to_string(), metadata_id.to_string());
        }
        context
    }

    fn matches(&self, alert: &Alert, event: &ErrorEvent) -> bool {
        let AlertTrigger::Error(trigger) = &alert.model.trigger else {
            return false;
        };
        if !trigger.selects(event) {
            return false;
        }
        match self.patterns.get(alert.id()) {
            Some(pattern) => pattern.is_match(&event.formatted_message()),
            None => true,
        }
    }
}

impl EventListener for DefaultAlertWorker {
    fn name(&self) -> &str {
        "default-alert-worker"
    }

    fn accepts(&self, event: &Event) -> bool {
        event.as_error().is_some()
    }

    fn handle_event(&self, event: &Event) {
        let Some(error) = event.as_error() else {
            return;
        };
        for alert in self.core.alerts() {
            if self.matches(&alert, error) {
                self.core.trigger(&alert, Self::build_context(&alert, error));
            }
        }
    }
}

impl AlertWorker for DefaultAlertWorker {
    fn trigger_type(&self) -> &str {
        ERROR_TRIGGER_TYPE
    }

    fn enable_alert(&self, model: AlertModel) -> AlertResult<()> {
        let AlertTrigger::Error(trigger) = &model.trigger else {
            return Err(AlertError::WorkerNotFound {
                alert_id: model.id.clone(),
                trigger_type: model.trigger.trigger_type().to_string(),
            });
        };

        match trigger.regex.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(regex) => {
                let pattern =
                    Regex::new(regex).map_err(|e| AlertError::invalid_alert(&model.id, e))?;
                self.patterns.insert(model.id.clone(), pattern);
            }
            None => {
                self.patterns.remove(&model.id);
            }
        }

        self.core.enable(model);
        Ok(())
    }

    fn disable_alert(&self, alert_id: &str) -> bool {
        self.patterns.remove(alert_id);
        self.core.disable(alert_id).is_some()
    }

    fn enabled_alert(&self, alert_id: &str) -> Option<Arc<Alert>> {
        self.core.get(alert_id)
    }

    fn shutdown(&self) {
        self.core.shutdown();
    }
}
