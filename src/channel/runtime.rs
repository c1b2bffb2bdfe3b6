use super::chain::DestinationChain;
use super::response_selector::ResponseSelector;
use super::services::ChannelServices;
use crate::connector::{DestinationConnector, SourceConnector};
use crate::constants::{SOURCE_CONNECTOR_NAME, SOURCE_METADATA_ID};
use crate::engine::GlobalMap;
use crate::error::{EngineError, Result};
use crate::events::ErrorEventType;
use crate::message::{ConnectorMessage, DispatchResult, Message, MessageContent, RawMessage, Status};
use crate::pipeline::PipelineContext;
use crate::queue::{MessageQueue, OverflowPolicy, QueueClosed};
use crate::state_machine::{
    ConnectorActivity, ConnectorState, ConnectorStateMachine, InitialState, LifecycleEvent,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Source message waiting in the source queue
#[derive(Debug, Clone)]
pub struct SourceQueueItem {
    pub message: ConnectorMessage,
    pub destinations: Option<Vec<u32>>,
}

struct SourceTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Everything a channel is assembled from
pub(crate) struct ChannelParts {
    pub id: String,
    pub name: String,
    pub revision: u32,
    pub tags: Vec<String>,
    pub initial_state: InitialState,
    pub source: SourceConnector,
    pub chains: Vec<DestinationChain>,
    pub source_queue_capacity: usize,
    pub response_selector: ResponseSelector,
    pub context: PipelineContext,
    pub services: ChannelServices,
    pub stop_timeout: Duration,
}

/// A deployed channel: one source, its destination chains and their tasks
pub struct Channel {
    id: String,
    name: String,
    revision: u32,
    tags: Vec<String>,
    initial_state: InitialState,
    deployed_at: DateTime<Utc>,
    state: ConnectorStateMachine,
    source: SourceConnector,
    chains: Vec<DestinationChain>,
    destinations: BTreeMap<u32, Arc<DestinationConnector>>,
    source_queue: Arc<MessageQueue<SourceQueueItem>>,
    source_tasks: parking_lot::Mutex<Option<SourceTasks>>,
    source_in_flight: parking_lot::Mutex<Option<SourceQueueItem>>,
    response_selector: ResponseSelector,
    context: PipelineContext,
    services: ChannelServices,
    lifecycle: tokio::sync::Mutex<()>,
    next_message_id: AtomicU64,
    stop_timeout: Duration,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("revision", &self.revision)
            .field("state", &self.state.current_state())
            .field("destinations", &self.destinations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Channel {
    pub(crate) fn from_parts(parts: ChannelParts) -> Self {
        let destinations = parts
            .chains
            .iter()
            .flat_map(|chain| chain.destinations().iter())
            .map(|d| (d.metadata_id(), Arc::clone(d)))
            .collect();

        Self {
            state: ConnectorStateMachine::new(format!("channel {}", parts.id)),
            id: parts.id,
            name: parts.name,
            revision: parts.revision,
            tags: parts.tags,
            initial_state: parts.initial_state,
            deployed_at: Utc::now(),
            source: parts.source,
            chains: parts.chains,
            destinations,
            source_queue: Arc::new(MessageQueue::new(
                parts.source_queue_capacity,
                OverflowPolicy::Block,
            )),
            source_tasks: parking_lot::Mutex::new(None),
            source_in_flight: parking_lot::Mutex::new(None),
            response_selector: parts.response_selector,
            context: parts.context,
            services: parts.services,
            lifecycle: tokio::sync::Mutex::new(()),
            next_message_id: AtomicU64::new(1),
            stop_timeout: parts.stop_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn initial_state(&self) -> InitialState {
        self.initial_state
    }

    pub fn deployed_at(&self) -> DateTime<Utc> {
        self.deployed_at
    }

    pub fn current_state(&self) -> ConnectorState {
        self.state.current_state()
    }

    pub fn source(&self) -> &SourceConnector {
        &self.source
    }

    pub fn chains(&self) -> &[DestinationChain] {
        &self.chains
    }

    pub fn destination(&self, metadata_id: u32) -> Option<&Arc<DestinationConnector>> {
        self.destinations.get(&metadata_id)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Arc<DestinationConnector>> {
        self.destinations.values()
    }

    pub fn source_queue_len(&self) -> usize {
        self.source_queue.len()
    }

    pub fn response_selector(&self) -> &ResponseSelector {
        &self.response_selector
    }

    pub fn global_channel_map(&self) -> &Arc<GlobalMap> {
        &self.context.global_channel_map
    }

    pub fn destination_name_map(&self) -> &HashMap<String, String> {
        &self.context.destination_name_map
    }

    pub fn services(&self) -> &ChannelServices {
        &self.services
    }

    fn apply(&self, event: LifecycleEvent) -> Result<ConnectorState> {
        Ok(self.state.transition(event)?)
    }

    fn not_started(&self) -> EngineError {
        EngineError::ChannelNotStarted {
            channel_id: self.id.clone(),
            state: self.current_state(),
        }
    }

    /// Push one raw message through the channel.
    ///
    /// Non-forced dispatches are refused unless the channel is started.
    pub async fn dispatch(&self, raw: RawMessage, force: bool) -> Result<DispatchResult> {
        if !force && !self.current_state().is_accepting() {
            return Err(self.not_started());
        }

        let guard = self.source.begin_dispatch();
        let result = self.dispatch_raw(raw).await;
        guard.finish();
        result
    }

    async fn dispatch_raw(&self, raw: RawMessage) -> Result<DispatchResult> {
        let RawMessage {
            raw_data,
            source_map,
            destination_metadata_ids,
        } = raw;

        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let source = ConnectorMessage::new(
            message_id,
            &self.id,
            SOURCE_METADATA_ID,
            SOURCE_CONNECTOR_NAME,
            MessageContent::new(raw_data, self.source.filter_transformer().inbound().name()),
            Arc::new(source_map),
        );
        self.services.record(&source).await;

        if self.source.queue_enabled() {
            let item = SourceQueueItem {
                message: source,
                destinations: destination_metadata_ids,
            };
            if let Err(QueueClosed(_)) = self.source_queue.push(item).await {
                return Err(self.not_started());
            }
            debug!(channel_id = %self.id, message_id, "CHANNEL: Message accepted into source queue");
            return Ok(DispatchResult {
                channel_id: self.id.clone(),
                message_id,
                selected_response: self.response_selector.select_queued(),
                processed_message: None,
                queued: true,
            });
        }

        let message = self.process(source, destination_metadata_ids).await;
        Ok(DispatchResult {
            channel_id: self.id.clone(),
            message_id,
            selected_response: self.response_selector.select(&message),
            processed_message: Some(message),
            queued: false,
        })
    }

    /// Source pipeline followed by every destination chain
    async fn process(&self, mut source: ConnectorMessage, targets: Option<Vec<u32>>) -> Message {
        self.source.set_activity(ConnectorActivity::Receiving);
        let outcome = self.source.filter_transformer().execute(&mut source).await;
        self.source.set_activity(ConnectorActivity::Idle);

        match outcome {
            Err(e) => {
                if let Err(status) = source.fail(e.to_string()) {
                    warn!(error = %status, "CHANNEL: Ignoring invalid status transition");
                }
                self.services.record(&source).await;
                self.services.emit_connector_error(
                    SOURCE_METADATA_ID,
                    SOURCE_CONNECTOR_NAME,
                    e.error_event_type(),
                    e.summary(),
                    &e,
                );
                return self.finalize(Message::new(source)).await;
            }
            Ok(result) if !result.accepted => {
                if let Err(status) = source.set_status(Status::Filtered) {
                    warn!(error = %status, "CHANNEL: Ignoring invalid status transition");
                }
                self.services.record(&source).await;
                return self.finalize(Message::new(source)).await;
            }
            Ok(_) => {
                if let Err(status) = source.set_status(Status::Transformed) {
                    warn!(error = %status, "CHANNEL: Ignoring invalid status transition");
                }
                self.services.record(&source).await;
            }
        }

        let targets = targets.as_deref();
        let results = join_all(
            self.chains
                .iter()
                .map(|chain| chain.process(&source, targets)),
        )
        .await;

        let mut message = Message::new(source);
        for destination in results.into_iter().flatten() {
            message.add(destination);
        }
        self.finalize(message).await
    }

    async fn finalize(&self, mut message: Message) -> Message {
        message.processed = true;
        if self.services.storage.should_remove_content(&message) {
            if let Err(e) = self
                .services
                .store
                .remove_content(&self.id, message.message_id)
                .await
            {
                warn!(channel_id = %self.id, message_id = message.message_id, error = %e, "CHANNEL: Failed to remove message content");
            }
        }
        message
    }

    async fn run_source_queue(
        channel: Weak<Self>,
        queue: Arc<MessageQueue<SourceQueueItem>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let item = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                item = queue.pop() => item,
            };
            let Some(item) = item else {
                break;
            };
            let Some(channel) = channel.upgrade() else {
                break;
            };

            let guard = channel.source.begin_dispatch();
            *channel.source_in_flight.lock() = Some(item.clone());
            channel.process(item.message, item.destinations).await;
            channel.source_in_flight.lock().take();
            guard.finish();
        }
    }

    async fn run_poll_loop(channel: Weak<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(this) = channel.upgrade() else {
                break;
            };

            this.source.set_activity(ConnectorActivity::Polling);
            match this.source.transport().poll().await {
                Ok(batch) => {
                    for raw in batch {
                        if *shutdown.borrow() {
                            break;
                        }
                        let guard = this.source.begin_dispatch();
                        if let Err(e) = this.dispatch_raw(raw).await {
                            this.services.emit_connector_error(
                                SOURCE_METADATA_ID,
                                SOURCE_CONNECTOR_NAME,
                                ErrorEventType::SourceConnector,
                                "Error processing polled message",
                                &e,
                            );
                        }
                        guard.finish();
                    }
                }
                Err(e) => this.services.emit_connector_error(
                    SOURCE_METADATA_ID,
                    SOURCE_CONNECTOR_NAME,
                    ErrorEventType::SourceConnector,
                    "Error polling for messages",
                    &e,
                ),
            }
            this.source.set_activity(ConnectorActivity::Idle);
            drop(this);

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Deploy every connector. A failure undeploys what was already deployed.
    pub async fn deploy(&self) -> Result<()> {
        if let Err(e) = self.deploy_connectors().await {
            if let Err(cleanup) = self.undeploy_connectors().await {
                debug!(channel_id = %self.id, error = %cleanup, "CHANNEL: Cleanup after failed deploy reported an error");
            }
            return Err(e);
        }
        self.state.mark_deployed();
        info!(channel_id = %self.id, revision = self.revision, "CHANNEL: Deployed");
        Ok(())
    }

    async fn deploy_connectors(&self) -> Result<()> {
        self.source.deploy().await?;
        for destination in self.destinations.values() {
            destination.deploy().await?;
        }
        Ok(())
    }

    async fn undeploy_connectors(&self) -> Result<()> {
        let mut first_error = None;
        if let Err(e) = self.source.undeploy().await {
            first_error.get_or_insert(e);
        }
        for destination in self.destinations.values() {
            if let Err(e) = destination.undeploy().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Release queues and transports. The channel must already be stopped.
    pub async fn undeploy(&self) -> Result<()> {
        self.state.mark_undeployed();
        self.source_queue.close();
        let drained = self.source_queue.drain();
        if !drained.is_empty() {
            info!(
                channel_id = %self.id,
                count = drained.len(),
                "CHANNEL: Released buffered source messages on undeploy"
            );
        }
        let result = self.undeploy_connectors().await;
        info!(channel_id = %self.id, "CHANNEL: Undeployed");
        result
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.current_state() {
            ConnectorState::Started => return Ok(()),
            ConnectorState::Paused => return self.resume_locked().await,
            _ => {}
        }

        self.apply(LifecycleEvent::Start)?;

        let mut started: Vec<&Arc<DestinationConnector>> = Vec::new();
        for destination in self.destinations.values() {
            if let Err(e) = destination.start().await {
                self.rollback_start(&started).await;
                return Err(e);
            }
            started.push(destination);
        }

        if let Err(e) = self.start_source().await {
            self.rollback_start(&started).await;
            return Err(e);
        }

        self.apply(LifecycleEvent::StartCompleted)?;
        info!(channel_id = %self.id, "CHANNEL: Started");
        Ok(())
    }

    async fn rollback_start(&self, started: &[&Arc<DestinationConnector>]) {
        for destination in started {
            if let Err(e) = destination.stop().await {
                debug!(channel_id = %self.id, error = %e, "CHANNEL: Rollback stop reported an error");
            }
        }
        if let Err(e) = self.apply(LifecycleEvent::StartFailed) {
            debug!(channel_id = %self.id, error = %e, "CHANNEL: Start rollback superseded");
        }
    }

    async fn start_source(self: &Arc<Self>) -> Result<()> {
        self.source.start().await?;

        let (shutdown, receiver) = watch::channel(false);
        let mut handles = Vec::new();
        if self.source.queue_enabled() {
            handles.push(tokio::spawn(Self::run_source_queue(
                Arc::downgrade(self),
                Arc::clone(&self.source_queue),
                receiver.clone(),
            )));
        }
        if let Some(interval) = self.source.polling_interval() {
            handles.push(tokio::spawn(Self::run_poll_loop(
                Arc::downgrade(self),
                interval,
                receiver,
            )));
        }

        if let Some(previous) = self
            .source_tasks
            .lock()
            .replace(SourceTasks { shutdown, handles })
        {
            for handle in previous.handles {
                handle.abort();
            }
        }
        Ok(())
    }

    /// Stop the source and its tasks. Graceful stops let in-flight work finish.
    async fn stop_source(&self, graceful: bool) -> Result<()> {
        let tasks = self.source_tasks.lock().take();
        if let Some(SourceTasks { shutdown, handles }) = tasks {
            let _ = shutdown.send(true);
            for mut handle in handles {
                if !graceful {
                    handle.abort();
                } else if tokio::time::timeout(self.stop_timeout, &mut handle)
                    .await
                    .is_err()
                {
                    warn!(channel_id = %self.id, "CHANNEL: Source task did not stop in time, aborting");
                    handle.abort();
                } else {
                    continue;
                }
                let _ = handle.await;
            }

            let interrupted = self.source_in_flight.lock().take();
            if let Some(item) = interrupted {
                info!(
                    channel_id = %self.id,
                    message_id = item.message.message_id,
                    "CHANNEL: Requeued source message interrupted mid-dispatch"
                );
                self.source_queue.requeue_front(item);
            }
        }

        if !graceful {
            return self.source.halt().await;
        }

        let result = self.source.stop().await;
        if !self.source.dispatches().wait_idle(self.stop_timeout).await {
            warn!(
                channel_id = %self.id,
                in_flight = self.source.dispatches().in_flight(),
                "CHANNEL: Dispatches still in flight after stop timeout"
            );
        }
        result
    }

    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> Result<()> {
        if !matches!(
            self.current_state(),
            ConnectorState::Started | ConnectorState::Paused
        ) {
            return Ok(());
        }
        self.apply(LifecycleEvent::Stop)?;

        let mut first_error = self.stop_source(true).await.err();
        for destination in self.destinations.values() {
            if let Err(e) = destination.stop().await {
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.apply(LifecycleEvent::StopCompleted) {
            info!(channel_id = %self.id, error = %e, "CHANNEL: Stop superseded by halt");
            return Ok(());
        }
        info!(channel_id = %self.id, "CHANNEL: Stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Stop accepting messages at the source; destinations keep draining
    pub async fn pause(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.current_state() {
            ConnectorState::Paused => return Ok(()),
            ConnectorState::Started => {}
            other => {
                return Err(EngineError::pause(
                    format!("channel {}", self.id),
                    format!("channel is {other}"),
                ))
            }
        }

        self.apply(LifecycleEvent::Pause)?;
        if let Err(e) = self.stop_source(true).await {
            self.apply(LifecycleEvent::PauseFailed)?;
            return Err(EngineError::pause(format!("channel {}", self.id), e));
        }
        self.apply(LifecycleEvent::PauseCompleted)?;
        info!(channel_id = %self.id, "CHANNEL: Paused");
        Ok(())
    }

    pub async fn resume(self: &Arc<Self>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.resume_locked().await
    }

    async fn resume_locked(self: &Arc<Self>) -> Result<()> {
        match self.current_state() {
            ConnectorState::Started => return Ok(()),
            ConnectorState::Paused => {}
            other => {
                return Err(EngineError::start(
                    format!("channel {}", self.id),
                    format!("cannot resume a channel that is {other}"),
                ))
            }
        }

        self.start_source().await?;
        self.apply(LifecycleEvent::Resume)?;
        info!(channel_id = %self.id, "CHANNEL: Resumed");
        Ok(())
    }

    /// Forced stop. Bypasses the lifecycle lock and is legal from any state.
    pub async fn halt(&self) -> Result<()> {
        self.apply(LifecycleEvent::Halt)?;

        let mut first_error = self.stop_source(false).await.err();
        for destination in self.destinations.values() {
            if let Err(e) = destination.halt().await {
                first_error.get_or_insert(e);
            }
        }

        self.apply(LifecycleEvent::HaltCompleted)?;
        warn!(channel_id = %self.id, "CHANNEL: Halted");
        first_error.map_or(Ok(()), Err)
    }

    /// Start a single connector; 0 addresses the source
    pub async fn start_connector(self: &Arc<Self>, metadata_id: u32) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if metadata_id == SOURCE_METADATA_ID {
            return self.start_source().await;
        }
        self.connector(metadata_id)?.start().await
    }

    pub async fn stop_connector(&self, metadata_id: u32) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if metadata_id == SOURCE_METADATA_ID {
            return self.stop_source(true).await;
        }
        self.connector(metadata_id)?.stop().await
    }

    fn connector(&self, metadata_id: u32) -> Result<&Arc<DestinationConnector>> {
        self.destinations
            .get(&metadata_id)
            .ok_or_else(|| EngineError::ConnectorNotFound {
                channel_id: self.id.clone(),
                metadata_id,
            })
    }
}
