//! In-memory transports with scripted failures and call recording.

use crate::config::ConnectorConfig;
use crate::connector::{
    ConnectorLifecycle, ConnectorRegistry, DestinationTransport, SourceTransport, TransportError,
    TransportResult,
};
use crate::message::{ConnectorMessage, RawMessage, Response};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Lifecycle hook names, in the order they were called
#[derive(Debug, Default)]
pub struct LifecycleLog {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl LifecycleLog {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == hook).count()
    }

    /// Make a hook (`deploy`, `start`, `stop`, `halt`, `undeploy`) fail
    pub fn fail_on(&self, hook: &'static str) {
        self.failing.lock().insert(hook);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    fn record(&self, hook: &'static str) -> TransportResult<()> {
        self.calls.lock().push(hook);
        if self.failing.lock().contains(hook) {
            return Err(TransportError::fatal(format!("{hook} failed")));
        }
        Ok(())
    }
}

macro_rules! recorded_lifecycle {
    ($transport:ty) => {
        #[async_trait]
        impl ConnectorLifecycle for $transport {
            async fn on_deploy(&self) -> TransportResult<()> {
                self.lifecycle.record("deploy")
            }

            async fn on_undeploy(&self) -> TransportResult<()> {
                self.lifecycle.record("undeploy")
            }

            async fn on_start(&self) -> TransportResult<()> {
                self.lifecycle.record("start")
            }

            async fn on_stop(&self) -> TransportResult<()> {
                if let Some(delay) = self.stop_delay {
                    tokio::time::sleep(delay).await;
                }
                self.lifecycle.record("stop")
            }

            async fn on_halt(&self) -> TransportResult<()> {
                self.lifecycle.record("halt")
            }
        }
    };
}

/// Source that either waits for pushed dispatches or polls a scripted inbox
#[derive(Debug, Default)]
pub struct MockSource {
    pub lifecycle: LifecycleLog,
    polling_interval: Option<Duration>,
    stop_delay: Option<Duration>,
    inbox: Mutex<VecDeque<RawMessage>>,
    poll_failures: AtomicU32,
    polls: AtomicU32,
}

impl MockSource {
    pub fn push() -> Self {
        Self::default()
    }

    pub fn polling(interval: Duration) -> Self {
        Self {
            polling_interval: Some(interval),
            ..Default::default()
        }
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    /// Queue a message for the next poll
    pub fn deliver(&self, raw: RawMessage) {
        self.inbox.lock().push_back(raw);
    }

    pub fn fail_next_polls(&self, count: u32) {
        self.poll_failures.store(count, Ordering::SeqCst);
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }
}

recorded_lifecycle!(MockSource);

#[async_trait]
impl SourceTransport for MockSource {
    fn polling_interval(&self) -> Option<Duration> {
        self.polling_interval
    }

    async fn poll(&self) -> TransportResult<Vec<RawMessage>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.poll_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.poll_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::retryable("poll failed"));
        }
        Ok(self.inbox.lock().drain(..).collect())
    }
}

/// Destination that records what it sends.
///
/// Sends can be delayed, made to fail a number of times, or held until
/// released with [`MockDestination::release`].
#[derive(Debug, Default)]
pub struct MockDestination {
    pub lifecycle: LifecycleLog,
    sent: Mutex<Vec<String>>,
    attempts: AtomicU32,
    failures_left: AtomicU32,
    fail_retryable: bool,
    delay: Option<Duration>,
    stop_delay: Option<Duration>,
    response: Option<Response>,
    gate: Option<Arc<Notify>>,
    sent_signal: Notify,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` sends; `u32::MAX` fails forever
    pub fn failing(mut self, times: u32, retryable: bool) -> Self {
        self.failures_left = AtomicU32::new(times);
        self.fail_retryable = retryable;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    /// Hold every send until [`MockDestination::release`] is called
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Let one held send through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` messages were sent successfully
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.sent_signal.notified();
                if self.sent_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

recorded_lifecycle!(MockDestination);

#[async_trait]
impl DestinationTransport for MockDestination {
    async fn send(&self, _properties: &Value, message: &ConnectorMessage) -> TransportResult<Response> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failures = self.failures_left.load(Ordering::SeqCst);
        if failures > 0 {
            if failures != u32::MAX {
                self.failures_left.store(failures - 1, Ordering::SeqCst);
            }
            let message = format!("send failed for message {}", message.message_id);
            return Err(if self.fail_retryable {
                TransportError::retryable(message)
            } else {
                TransportError::fatal(message)
            });
        }

        let content = message.encoded_content().to_string();
        self.sent.lock().push(content.clone());
        self.sent_signal.notify_waiters();
        Ok(self
            .response
            .clone()
            .unwrap_or_else(|| Response::sent(format!("ACK:{content}"))))
    }
}

/// Registry wired to shared mock transports, so tests keep a handle on them
#[derive(Debug, Default)]
pub struct MockConnectors {
    registry: Arc<ConnectorRegistry>,
}

impl MockConnectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, transport_type: &str, source: MockSource) -> Arc<MockSource> {
        let source = Arc::new(source);
        let shared = Arc::clone(&source);
        self.registry
            .register_source(transport_type, move |_config: &ConnectorConfig| {
                Ok(Arc::clone(&shared) as Arc<dyn SourceTransport>)
            });
        source
    }

    pub fn destination(&self, transport_type: &str, destination: MockDestination) -> Arc<MockDestination> {
        let destination = Arc::new(destination);
        let shared = Arc::clone(&destination);
        self.registry
            .register_destination(transport_type, move |_config: &ConnectorConfig| {
                Ok(Arc::clone(&shared) as Arc<dyn DestinationTransport>)
            });
        destination
    }

    pub fn registry(&self) -> Arc<ConnectorRegistry> {
        Arc::clone(&self.registry)
    }
}
