//! # Alert Actions
//!
//! Actions run one at a time on a single executor task, in submission order.
//! Each task re-checks its alert at execution time and drops itself when the
//! alert was disabled, or disabled and re-enabled, after the task was created.

use super::errors::{AlertError, AlertResult};
use super::model::{ActionGroup, AlertProtocol};
use super::template::replace_values;
use super::worker::Alert;
use crate::constants::ALERT_DISPATCHED_EVENT;
use crate::events::{EventDispatcher, EventLevel, ServerEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Outbound e-mail seam
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> AlertResult<()>;
}

/// Routes an alert body into a channel as a new raw message
#[async_trait]
pub trait MessageRouter: Send + Sync {
    async fn route(&self, channel_id: &str, body: String) -> crate::error::Result<()>;
}

/// Live alerts of one worker, shared with its queued tasks
pub type EnabledAlerts = Arc<DashMap<String, Arc<Alert>>>;

/// One action group of one triggered alert
#[derive(Debug)]
pub struct ActionTask {
    pub alert_id: String,
    pub group: ActionGroup,
    pub context: HashMap<String, String>,
    pub created_at: Instant,
    enabled_alerts: EnabledAlerts,
}

impl ActionTask {
    pub fn new(
        alert_id: impl Into<String>,
        group: ActionGroup,
        context: HashMap<String, String>,
        enabled_alerts: EnabledAlerts,
    ) -> Self {
        Self {
            alert_id: alert_id.into(),
            group,
            context,
            created_at: Instant::now(),
            enabled_alerts,
        }
    }

    /// The alert is still enabled and was enabled no later than this task's creation
    pub fn is_current(&self) -> bool {
        self.enabled_alerts
            .get(&self.alert_id)
            .is_some_and(|alert| alert.enabled_at <= self.created_at)
    }
}

/// Performs the external side of alert actions
pub struct ActionRunner {
    email: RwLock<Option<Arc<dyn EmailSender>>>,
    router: RwLock<Option<Weak<dyn MessageRouter>>>,
    events: Arc<EventDispatcher>,
    default_subject: String,
}

impl fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRunner")
            .field("email", &self.email.read().is_some())
            .field("router", &self.router.read().is_some())
            .field("default_subject", &self.default_subject)
            .finish()
    }
}

impl ActionRunner {
    pub fn new(events: Arc<EventDispatcher>, default_subject: impl Into<String>) -> Self {
        Self {
            email: RwLock::new(None),
            router: RwLock::new(None),
            events,
            default_subject: default_subject.into(),
        }
    }

    pub fn set_email_sender(&self, sender: Arc<dyn EmailSender>) {
        *self.email.write() = Some(sender);
    }

    /// Held weakly; the router usually owns the alert controller indirectly
    pub fn set_router(&self, router: &Arc<dyn MessageRouter>) {
        *self.router.write() = Some(Arc::downgrade(router));
    }

    /// Execute a task unless it went stale. Returns whether it ran.
    pub async fn run(&self, task: ActionTask) -> bool {
        if !task.is_current() {
            debug!(alert_id = %task.alert_id, "ALERT: Dropping stale action");
            return false;
        }

        let context = &task.context;
        let subject = task
            .group
            .subject
            .as_deref()
            .map(|s| replace_values(s, context))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_subject.clone());
        let body = task
            .group
            .template
            .as_deref()
            .map(|t| replace_values(t, context))
            .unwrap_or_default();

        let mut emails = Vec::new();
        let mut channels = Vec::new();
        for action in &task.group.actions {
            let recipient = replace_values(&action.recipient, context);
            if recipient.trim().is_empty() {
                continue;
            }
            match action.protocol {
                AlertProtocol::Email => emails.push(recipient),
                AlertProtocol::Channel => channels.push(recipient),
            }
        }

        if !emails.is_empty() {
            self.send_email(&task.alert_id, &emails, &subject, &body).await;
        }
        for channel_id in channels {
            self.route(&task.alert_id, &channel_id, body.clone()).await;
        }

        let attributes = context.clone();
        self.events.dispatch(
            ServerEvent::new(ALERT_DISPATCHED_EVENT, EventLevel::Information)
                .with_attributes(attributes),
        );
        true
    }

    async fn send_email(&self, alert_id: &str, recipients: &[String], subject: &str, body: &str) {
        let sender = self.email.read().clone();
        let Some(sender) = sender else {
            warn!(alert_id, "ALERT: No e-mail sender configured, skipping e-mail recipients");
            return;
        };
        if let Err(e) = sender.send(recipients, subject, body).await {
            error!(alert_id, error = %e, "ALERT: Error sending alert e-mail");
        }
    }

    async fn route(&self, alert_id: &str, channel_id: &str, body: String) {
        let router = self.router.read().as_ref().and_then(Weak::upgrade);
        let Some(router) = router else {
            warn!(alert_id, channel_id, "ALERT: No message router available, skipping channel recipient");
            return;
        };
        if let Err(e) = router.route(channel_id, body).await {
            error!(alert_id, channel_id, error = %e, "ALERT: Error routing alert to channel");
        }
    }
}

/// Single task draining an unbounded queue of actions
#[derive(Debug)]
pub struct ActionExecutor {
    sender: mpsc::UnboundedSender<ActionTask>,
    pending: Arc<AtomicUsize>,
    backlog_warning: usize,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ActionExecutor {
    /// Must be called inside a tokio runtime
    pub fn spawn(backlog_warning: usize, runner: Arc<ActionRunner>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ActionTask>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let worker = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                runner.run(task).await;
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
        });
        Self {
            sender,
            pending,
            backlog_warning: backlog_warning.max(1),
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Queue a task without waiting. Tasks are never dropped while the executor runs.
    pub fn submit(&self, task: ActionTask) -> AlertResult<()> {
        let alert_id = task.alert_id.clone();
        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if self.sender.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(AlertError::ExecutorClosed);
        }
        if pending == self.backlog_warning + 1 {
            warn!(
                alert_id = %alert_id,
                pending,
                "ALERT: Action backlog is growing faster than actions complete"
            );
        }
        Ok(())
    }

    /// Actions submitted and not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stop executing; queued actions are discarded
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl Drop for ActionExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
