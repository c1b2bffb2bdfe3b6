use super::transport::SourceTransport;
use crate::channel::ChannelServices;
use crate::config::ResponseConfig;
use crate::constants::{SOURCE_CONNECTOR_NAME, SOURCE_METADATA_ID};
use crate::error::{EngineError, Result};
use crate::events::ConnectionStatus;
use crate::pipeline::FilterTransformerExecutor;
use crate::state_machine::{ConnectorActivity, ConnectorState, ConnectorStateMachine, LifecycleEvent};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Counts dispatch begin/finish pairs and in-flight dispatches
#[derive(Debug, Default)]
pub struct DispatchTracker {
    started: AtomicU64,
    finished: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl DispatchTracker {
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no dispatch is in flight, or the timeout elapses.
    ///
    /// Returns whether the tracker went idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn finish_one(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Scoped handle for one dispatch; finishes exactly once.
///
/// Dropping an unfinished guard (early return, error, panic or a cancelled
/// future) finishes it.
#[derive(Debug)]
pub struct DispatchGuard {
    tracker: Arc<DispatchTracker>,
    finished: bool,
}

impl DispatchGuard {
    fn begin(tracker: Arc<DispatchTracker>) -> Self {
        tracker.started.fetch_add(1, Ordering::SeqCst);
        tracker.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            tracker,
            finished: false,
        }
    }

    pub fn finish(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        if !self.finished {
            self.finished = true;
            self.tracker.finish_one();
        }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Inbound connector of a channel (metadata id 0)
pub struct SourceConnector {
    state: ConnectorStateMachine,
    transport: Arc<dyn SourceTransport>,
    filter_transformer: FilterTransformerExecutor,
    response: ResponseConfig,
    dispatches: Arc<DispatchTracker>,
    services: ChannelServices,
}

impl std::fmt::Debug for SourceConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConnector")
            .field("channel_id", &self.services.channel_id)
            .field("state", &self.state.current_state())
            .field("respond_after_processing", &self.response.respond_after_processing)
            .finish()
    }
}

impl SourceConnector {
    pub fn new(
        transport: Arc<dyn SourceTransport>,
        filter_transformer: FilterTransformerExecutor,
        response: ResponseConfig,
        services: ChannelServices,
    ) -> Self {
        Self {
            state: ConnectorStateMachine::new(format!(
                "{}/{}",
                services.channel_id, SOURCE_CONNECTOR_NAME
            )),
            transport,
            filter_transformer,
            response,
            dispatches: Arc::new(DispatchTracker::default()),
            services,
        }
    }

    pub fn name(&self) -> &str {
        SOURCE_CONNECTOR_NAME
    }

    pub fn metadata_id(&self) -> u32 {
        SOURCE_METADATA_ID
    }

    pub fn current_state(&self) -> ConnectorState {
        self.state.current_state()
    }

    pub fn activity(&self) -> ConnectorActivity {
        self.state.activity()
    }

    pub fn filter_transformer(&self) -> &FilterTransformerExecutor {
        &self.filter_transformer
    }

    pub fn response(&self) -> &ResponseConfig {
        &self.response
    }

    /// Source queue is used when the caller is acknowledged before processing
    pub fn queue_enabled(&self) -> bool {
        !self.response.respond_after_processing
    }

    pub fn transport(&self) -> &Arc<dyn SourceTransport> {
        &self.transport
    }

    pub fn polling_interval(&self) -> Option<Duration> {
        self.transport.polling_interval()
    }

    pub fn dispatches(&self) -> &Arc<DispatchTracker> {
        &self.dispatches
    }

    pub fn begin_dispatch(&self) -> DispatchGuard {
        DispatchGuard::begin(Arc::clone(&self.dispatches))
    }

    /// Report an activity change when it differs from the current one
    pub fn set_activity(&self, activity: ConnectorActivity) {
        if self.state.set_activity(activity) != activity {
            self.services.emit_status(
                SOURCE_METADATA_ID,
                SOURCE_CONNECTOR_NAME,
                ConnectionStatus::Activity(activity),
            );
        }
    }

    fn apply(&self, event: LifecycleEvent) -> Result<ConnectorState> {
        let state = self.state.transition(event)?;
        self.services.emit_status(
            SOURCE_METADATA_ID,
            SOURCE_CONNECTOR_NAME,
            ConnectionStatus::State(state),
        );
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

    pub async fn undeploy(&self) -> Result<()> {
        self.state.mark_undeployed();
        self.transport
            .on_undeploy()
            .await
            .map_err(|e| EngineError::undeploy(&self.services.channel_id, e))
    }

    /// Start the transport. A failure leaves the connector stopped.
    pub async fn start(&self) -> Result<()> {
        if self.current_state() == ConnectorState::Started {
            return Ok(());
        }
        self.apply(LifecycleEvent::Start)?;

        match self.transport.on_start().await {
            Ok(()) => {
                self.apply(LifecycleEvent::StartCompleted)?;
                info!(channel_id = %self.services.channel_id, "CHANNEL: Source connector started");
                Ok(())
            }
            Err(e) => {
                self.apply(LifecycleEvent::StartFailed)?;
                Err(EngineError::start(
                    format!("source connector of channel {}", self.services.channel_id),
                    e,
                ))
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        if !self.current_state().is_running() {
            return Ok(());
        }
        self.apply(LifecycleEvent::Stop)?;
        let result = self.transport.on_stop().await;
        self.set_activity(ConnectorActivity::Idle);

        // A concurrent halt may already have moved the connector on
        if let Err(e) = self.apply(LifecycleEvent::StopCompleted) {
            debug!(channel_id = %self.services.channel_id, error = %e, "CHANNEL: Source stop superseded");
        }

        result.map_err(|e| {
            EngineError::stop(
                format!("source connector of channel {}", self.services.channel_id),
                e,
            )
        })
    }

    /// Forced stop; legal from any state
    pub async fn halt(&self) -> Result<()> {
        self.apply(LifecycleEvent::Halt)?;
        let result = self.transport.on_halt().await;
        self.set_activity(ConnectorActivity::Idle);
        self.apply(LifecycleEvent::HaltCompleted)?;
        result.map_err(|e| {
            EngineError::halt(
                format!("source connector of channel {}", self.services.channel_id),
                e,
            )
        })
    }
}
