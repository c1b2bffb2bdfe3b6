use super::transport::{DestinationTransport, TransportError};
use crate::channel::ChannelServices;
use crate::config::{QueueConfig, RetryDefaults};
use crate::constants::destination_key;
use crate::error::{EngineError, Result};
use crate::events::{ConnectionStatus, ErrorEventType};
use crate::message::{ConnectorMessage, Response, Status};
use crate::pipeline::{FilterTransformerExecutor, PipelineError, ResponseTransformerExecutor};
use crate::queue::{MessageQueue, OverflowPolicy, QueueClosed};
use crate::state_machine::{ConnectorActivity, ConnectorState, ConnectorStateMachine, LifecycleEvent};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Resolved queue and retry behavior of one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub enabled: bool,
    pub rotate: bool,
    pub retry_interval: Duration,
    /// 0 retries forever
    pub retry_count: u32,
    pub buffer_size: usize,
}

impl QueuePolicy {
    pub fn resolve(config: &QueueConfig, defaults: &RetryDefaults, buffer_size: usize) -> Self {
        Self {
            enabled: config.enabled,
            rotate: config.rotate,
            retry_interval: Duration::from_millis(
                config.retry_interval_ms.unwrap_or(defaults.retry_interval_ms),
            ),
            retry_count: config.retry_count.unwrap_or(defaults.retry_count),
            buffer_size: config.buffer_size.unwrap_or(buffer_size).max(1),
        }
    }

    /// Whether a message that has been attempted `attempts` times may be retried
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.retry_count == 0 || attempts < self.retry_count
    }

    fn overflow(&self) -> OverflowPolicy {
        if self.rotate {
            OverflowPolicy::Rotate
        } else {
            OverflowPolicy::Block
        }
    }
}

enum SendOutcome {
    Sent(Response),
    Failed(TransportError),
    Aborted(PipelineError),
}

struct QueueConsumer {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

/// Outbound connector with its own pipeline, optional queue and transport
pub struct DestinationConnector {
    metadata_id: u32,
    name: String,
    state: ConnectorStateMachine,
    transport: Arc<dyn DestinationTransport>,
    properties: Value,
    filter_transformer: FilterTransformerExecutor,
    response_transformer: ResponseTransformerExecutor,
    policy: QueuePolicy,
    queue: Option<Arc<MessageQueue<ConnectorMessage>>>,
    services: ChannelServices,
    stop_timeout: Duration,
    consumer: Mutex<Option<QueueConsumer>>,
    /// Message popped by the consumer and not yet handed to the transport
    in_flight: Mutex<Option<ConnectorMessage>>,
    terminated: AtomicBool,
}

impl fmt::Debug for DestinationConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConnector")
            .field("channel_id", &self.services.channel_id)
            .field("metadata_id", &self.metadata_id)
            .field("name", &self.name)
            .field("state", &self.state.current_state())
            .field("policy", &self.policy)
            .finish()
    }
}

impl DestinationConnector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metadata_id: u32,
        name: impl Into<String>,
        transport: Arc<dyn DestinationTransport>,
        properties: Value,
        filter_transformer: FilterTransformerExecutor,
        response_transformer: ResponseTransformerExecutor,
        policy: QueuePolicy,
        services: ChannelServices,
        stop_timeout: Duration,
    ) -> Self {
        let name = name.into();
        let queue = policy
            .enabled
            .then(|| Arc::new(MessageQueue::new(policy.buffer_size, policy.overflow())));

        Self {
            metadata_id,
            state: ConnectorStateMachine::new(format!("{}/{}", services.channel_id, name)),
            name,
            transport,
            properties,
            filter_transformer,
            response_transformer,
            policy,
            queue,
            services,
            stop_timeout,
            consumer: Mutex::new(None),
            in_flight: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn metadata_id(&self) -> u32 {
        self.metadata_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> ConnectorState {
        self.state.current_state()
    }

    pub fn activity(&self) -> ConnectorActivity {
        self.state.activity()
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    pub fn queue_enabled(&self) -> bool {
        self.policy.enabled
    }

    pub fn queued_count(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.len())
    }

    pub fn filter_transformer(&self) -> &FilterTransformerExecutor {
        &self.filter_transformer
    }

    pub fn response_transformer(&self) -> &ResponseTransformerExecutor {
        &self.response_transformer
    }

    fn target(&self) -> String {
        format!(
            "destination '{}' of channel {}",
            self.name, self.services.channel_id
        )
    }

    fn set_activity(&self, activity: ConnectorActivity) {
        if self.state.set_activity(activity) != activity {
            self.services.emit_status(
                self.metadata_id,
                &self.name,
                ConnectionStatus::Activity(activity),
            );
        }
    }

    fn apply(&self, event: LifecycleEvent) -> Result<ConnectorState> {
        let state = self.state.transition(event)?;
        self.services
            .emit_status(self.metadata_id, &self.name, ConnectionStatus::State(state));
        Ok(state)
    }

    pub async fn deploy(&self) -> Result<()> {
        self.transport
            .on_deploy()
            .await
            .map_err(|e| EngineError::deploy(&self.services.channel_id, e))?;
        self.state.mark_deployed();
        Ok(())
    }

    /// Release the queue and the transport.
    ///
    /// Buffered messages stay persisted as QUEUED.
    pub async fn undeploy(&self) -> Result<()> {
        self.state.mark_undeployed();
        if let Some(queue) = &self.queue {
            queue.close();
            let drained = queue.drain();
            if !drained.is_empty() {
                info!(
                    channel_id = %self.services.channel_id,
                    metadata_id = self.metadata_id,
                    count = drained.len(),
                    "CHANNEL: Released buffered queue entries on undeploy"
                );
            }
        }
        self.transport
            .on_undeploy()
            .await
            .map_err(|e| EngineError::undeploy(&self.services.channel_id, e))
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.current_state() == ConnectorState::Started {
            return Ok(());
        }
        self.apply(LifecycleEvent::Start)?;

        if let Err(e) = self.transport.on_start().await {
            self.apply(LifecycleEvent::StartFailed)?;
            return Err(EngineError::start(self.target(), e));
        }

        self.terminated.store(false, Ordering::SeqCst);
        if let Some(queue) = &self.queue {
            let shutdown = Arc::new(Notify::new());
            let task = tokio::spawn(Self::run_queue(
                Arc::downgrade(self),
                Arc::clone(queue),
                Arc::clone(&shutdown),
            ));
            if let Some(previous) = self.consumer.lock().replace(QueueConsumer { task, shutdown }) {
                previous.task.abort();
            }
        }

        self.apply(LifecycleEvent::StartCompleted)?;
        debug!(
            channel_id = %self.services.channel_id,
            metadata_id = self.metadata_id,
            "CHANNEL: Destination started"
        );
        Ok(())
    }

    /// Graceful stop: the queue consumer finishes its current message first
    pub async fn stop(&self) -> Result<()> {
        if !self.current_state().is_running() {
            return Ok(());
        }
        self.apply(LifecycleEvent::Stop)?;
        self.terminated.store(true, Ordering::SeqCst);

        let consumer = self.consumer.lock().take();
        if let Some(QueueConsumer { mut task, shutdown }) = consumer {
            shutdown.notify_one();
            if tokio::time::timeout(self.stop_timeout, &mut task).await.is_err() {
                warn!(
                    channel_id = %self.services.channel_id,
                    metadata_id = self.metadata_id,
                    "CHANNEL: Queue consumer did not stop in time, aborting"
                );
                task.abort();
                let _ = task.await;
                self.reclaim_in_flight();
            }
        }

        let result = self.transport.on_stop().await;
        self.set_activity(ConnectorActivity::Idle);
        if let Err(e) = self.apply(LifecycleEvent::StopCompleted) {
            debug!(target_name = %self.target(), error = %e, "CHANNEL: Destination stop superseded");
        }
        result.map_err(|e| EngineError::stop(self.target(), e))
    }

    /// Forced stop from any state; the queue consumer is aborted immediately
    pub async fn halt(&self) -> Result<()> {
        self.apply(LifecycleEvent::Halt)?;
        self.terminated.store(true, Ordering::SeqCst);
        let consumer = self.consumer.lock().take();
        if let Some(QueueConsumer { task, .. }) = consumer {
            task.abort();
            let _ = task.await;
            self.reclaim_in_flight();
        }
        let result = self.transport.on_halt().await;
        self.set_activity(ConnectorActivity::Idle);
        self.apply(LifecycleEvent::HaltCompleted)?;
        result.map_err(|e| EngineError::halt(self.target(), e))
    }

    /// Put a message whose send was cut short back at the head of the queue
    fn reclaim_in_flight(&self) {
        let message = self.in_flight.lock().take();
        if let (Some(queue), Some(message)) = (&self.queue, message) {
            info!(
                channel_id = %self.services.channel_id,
                metadata_id = self.metadata_id,
                message_id = message.message_id,
                "CHANNEL: Requeued message interrupted mid-send"
            );
            queue.requeue_front(message);
        }
    }

    /// Run this destination's part of a chain for one message.
    ///
    /// Returns once the message holds a status that lets the next destination
    /// of the chain proceed: FILTERED, SENT, ERROR or QUEUED.
    pub async fn process(&self, mut message: ConnectorMessage) -> ConnectorMessage {
        self.services.record(&message).await;

        match self.filter_transformer.execute(&mut message).await {
            Err(e) => {
                self.abort(&mut message, e).await;
                return message;
            }
            Ok(result) if !result.accepted => {
                self.set_status(&mut message, Status::Filtered);
                self.services.record(&message).await;
                return message;
            }
            Ok(_) => {
                self.set_status(&mut message, Status::Transformed);
                self.services.record(&message).await;
            }
        }

        if self.queue.is_some() {
            return self.enqueue(message).await;
        }

        if self.current_state() != ConnectorState::Started {
            let error = TransportError::fatal(format!(
                "Destination '{}' is not started ({})",
                self.name,
                self.current_state()
            ));
            self.complete(&mut message, SendOutcome::Failed(error)).await;
            return message;
        }

        let outcome = self.attempt(&mut message).await;
        self.complete(&mut message, outcome).await;
        message
    }

    fn set_status(&self, message: &mut ConnectorMessage, status: Status) {
        if let Err(e) = message.set_status(status) {
            warn!(error = %e, "CHANNEL: Ignoring invalid status transition");
        }
    }

    async fn enqueue(&self, mut message: ConnectorMessage) -> ConnectorMessage {
        self.set_status(&mut message, Status::Queued);
        self.services.record(&message).await;

        let Some(queue) = &self.queue else {
            return message;
        };
        let snapshot = message.clone();

        match queue.push(message).await {
            Ok(None) => snapshot,
            Ok(Some(evicted)) => {
                self.discard(evicted).await;
                snapshot
            }
            Err(QueueClosed(mut message)) => {
                let error = TransportError::fatal("destination queue is closed");
                self.complete(&mut message, SendOutcome::Failed(error)).await;
                message
            }
        }
    }

    /// A rotating queue dropped its oldest entry to make room
    async fn discard(&self, mut message: ConnectorMessage) {
        let error = TransportError::fatal(format!(
            "Queue buffer of {} is full, message discarded",
            self.policy.buffer_size
        ));
        warn!(
            channel_id = %self.services.channel_id,
            metadata_id = self.metadata_id,
            message_id = message.message_id,
            "CHANNEL: Rotating queue full, discarding oldest buffered message"
        );
        if let Err(e) = message.fail(error.message.clone()) {
            warn!(error = %e, "CHANNEL: Ignoring invalid status transition");
        }
        self.services.record(&message).await;
        self.services.emit_connector_error(
            self.metadata_id,
            &self.name,
            ErrorEventType::DestinationConnector,
            "Message discarded from full queue",
            &error,
        );
    }

    async fn attempt(&self, message: &mut ConnectorMessage) -> SendOutcome {
        self.set_activity(ConnectorActivity::Sending);
        message.send_attempts += 1;
        message.send_date = Some(Utc::now());
        message.sent = message.encoded.clone();

        let result = self.transport.send(&self.properties, message).await;
        self.set_activity(ConnectorActivity::Idle);

        match result {
            Ok(response) if response.status == Status::Error => {
                SendOutcome::Failed(TransportError::retryable(if response.error.is_empty() {
                    response.status_message
                } else {
                    response.error
                }))
            }
            Ok(response) => {
                message.record_response(&response, self.response_transformer.inbound().name());
                match self.response_transformer.execute(message, response).await {
                    Ok(transformed) => SendOutcome::Sent(transformed),
                    Err(e) => SendOutcome::Aborted(e),
                }
            }
            Err(e) => SendOutcome::Failed(e),
        }
    }

    fn store_response(&self, message: &mut ConnectorMessage, response: &Response) {
        if let Ok(value) = serde_json::to_value(response) {
            message
                .response_map
                .insert(destination_key(self.metadata_id), value);
        }
    }

    async fn abort(&self, message: &mut ConnectorMessage, error: PipelineError) {
        if let Err(e) = message.fail(error.to_string()) {
            warn!(error = %e, "CHANNEL: Ignoring invalid status transition");
        }
        self.services.record(message).await;
        self.services.emit_connector_error(
            self.metadata_id,
            &self.name,
            error.error_event_type(),
            error.summary(),
            &error,
        );
    }

    async fn complete(&self, message: &mut ConnectorMessage, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent(response) => {
                self.store_response(message, &response);
                // A response transformer may downgrade a successful send
                if response.status == Status::Error {
                    let reason = if response.error.is_empty() {
                        response.status_message.clone()
                    } else {
                        response.error.clone()
                    };
                    if let Err(e) = message.fail(reason) {
                        warn!(error = %e, "CHANNEL: Ignoring invalid status transition");
                    }
                } else {
                    self.set_status(message, Status::Sent);
                }
                self.services.record(message).await;
            }
            SendOutcome::Failed(error) => {
                self.store_response(message, &Response::error("Error sending message", &error.message));
                if let Err(e) = message.fail(error.message.clone()) {
                    warn!(error = %e, "CHANNEL: Ignoring invalid status transition");
                }
                self.services.record(message).await;
                self.services.emit_connector_error(
                    self.metadata_id,
                    &self.name,
                    ErrorEventType::DestinationConnector,
                    "Error sending message",
                    &error,
                );
            }
            SendOutcome::Aborted(error) => self.abort(message, error).await,
        }
    }

    async fn run_queue(
        destination: Weak<Self>,
        queue: Arc<MessageQueue<ConnectorMessage>>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.notified() => None,
                message = queue.pop() => message,
            };
            let Some(mut message) = next else {
                break;
            };

            let Some(this) = destination.upgrade() else {
                queue.requeue_front(message);
                break;
            };
            if this.terminated.load(Ordering::SeqCst) {
                queue.requeue_front(message);
                break;
            }

            *this.in_flight.lock() = Some(message.clone());
            let outcome = this.attempt(&mut message).await;

            match outcome {
                SendOutcome::Failed(error)
                    if error.retryable && this.policy.allows_retry(message.send_attempts) =>
                {
                    warn!(
                        channel_id = %this.services.channel_id,
                        metadata_id = this.metadata_id,
                        message_id = message.message_id,
                        attempts = message.send_attempts,
                        error = %error,
                        "CHANNEL: Queued send failed, will retry"
                    );
                    this.set_status(&mut message, Status::Queued);
                    message.processing_error = Some(error.message.clone());
                    this.services.record(&message).await;
                    this.services.emit_connector_error(
                        this.metadata_id,
                        &this.name,
                        ErrorEventType::DestinationConnector,
                        "Error sending queued message",
                        &error,
                    );

                    this.in_flight.lock().take();
                    if this.policy.rotate {
                        queue.requeue_back(message);
                    } else {
                        queue.requeue_front(message);
                    }

                    let retry_interval = this.policy.retry_interval;
                    drop(this);
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = tokio::time::sleep(retry_interval) => {}
                    }
                }
                outcome => {
                    this.in_flight.lock().take();
                    message.processing_error = None;
                    this.complete(&mut message, outcome).await;
                }
            }
        }
    }
}
