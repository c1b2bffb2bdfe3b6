//! # Engine Controller
//!
//! Owns the deployed-channel set. Deploy, undeploy and redeploy hold one
//! controller-wide lock for their whole duration; per-channel lifecycle calls
//! are serialized by the channel itself. A failure of one channel is logged,
//! reported once as an error event and never aborts a batch.

use super::context::EngineContext;
use super::status::DashboardStatus;
use crate::alert::MessageRouter;
use crate::channel::{build_channel, Channel};
use crate::error::{EngineError, Result};
use crate::events::ErrorEvent;
use crate::logging::{log_channel_operation, log_connector_operation};
use crate::message::{DispatchResult, RawMessage};
use crate::state_machine::InitialState;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct EngineController {
    context: Arc<EngineContext>,
    channels: DashMap<String, Arc<Channel>>,
    deploy_lock: tokio::sync::Mutex<()>,
    interrupted: AtomicBool,
}

impl EngineController {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            channels: DashMap::new(),
            deploy_lock: tokio::sync::Mutex::new(()),
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn channel(&self, channel_id: &str) -> Option<Arc<Channel>> {
        self.channels.get(channel_id).map(|c| Arc::clone(c.value()))
    }

    pub fn is_deployed(&self, channel_id: &str) -> bool {
        self.channels.contains_key(channel_id)
    }

    pub fn deployed_channel_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.iter().map(|c| c.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Ask the running (or next) batch operation to stop between channels.
    /// The batch that observes the request consumes it.
    pub fn interrupt(&self) {
        warn!("ENGINE: Interrupt requested");
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    fn check_interrupted(&self, operation: &str) -> Result<()> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Interrupted {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Log a channel failure and emit its error event
    fn report(&self, channel_id: &str, err: &EngineError) {
        error!(channel_id, error = %err, "ENGINE: Channel operation failed");
        self.context.events.dispatch(
            ErrorEvent::new(err.error_event_type(), err.to_string()).for_channel(channel_id),
        );
    }

    fn reported<T>(&self, channel_id: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.report(channel_id, e);
        }
        result
    }

    fn deployed(&self, channel_id: &str) -> Result<Arc<Channel>> {
        self.channel(channel_id)
            .ok_or_else(|| EngineError::channel_not_found(channel_id))
    }

    /// Deploy each channel in turn; failures are isolated per channel
    pub async fn deploy_channels(&self, channel_ids: &[String]) -> Result<()> {
        let _deploy = self.deploy_lock.lock().await;
        self.deploy_locked(channel_ids).await
    }

    /// Deploy every enabled channel the repository knows about
    pub async fn deploy_all_channels(&self) -> Result<()> {
        let _deploy = self.deploy_lock.lock().await;
        let ids = self.enabled_channel_ids().await?;
        self.deploy_locked(&ids).await
    }

    async fn enabled_channel_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .context
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| c.id)
            .collect())
    }

    async fn deploy_locked(&self, channel_ids: &[String]) -> Result<()> {
        for channel_id in channel_ids {
            self.check_interrupted("deploy")?;
            if let Err(e) = self.deploy_one(channel_id).await {
                self.report(channel_id, &e);
            }
        }
        Ok(())
    }

    async fn deploy_one(&self, channel_id: &str) -> Result<()> {
        let config = self.context.repository.get(channel_id).await?;
        if !config.enabled {
            debug!(channel_id, "ENGINE: Skipping disabled channel");
            return Ok(());
        }

        if self.is_deployed(channel_id) {
            info!(channel_id, "ENGINE: Channel already deployed, redeploying");
            if let Err(e) = self.undeploy_one(channel_id).await {
                self.report(channel_id, &e);
            }
        }

        let channel = build_channel(&config, &self.context)?;
        channel.deploy().await?;
        self.channels
            .insert(channel_id.to_string(), Arc::clone(&channel));
        log_channel_operation("deploy", channel_id, Some(config.revision), "deployed", None);

        // Start failures leave the channel deployed and stopped
        let started = match channel.initial_state() {
            InitialState::Stopped => Ok(()),
            InitialState::Started => channel.start().await,
            InitialState::Paused => match channel.start().await {
                Ok(()) => channel.pause().await,
                Err(e) => Err(e),
            },
        };
        if let Err(e) = started {
            self.report(channel_id, &e);
        }
        Ok(())
    }

    /// Stop and release each channel; failures are logged and skipped
    pub async fn undeploy_channels(&self, channel_ids: &[String]) -> Result<()> {
        let _deploy = self.deploy_lock.lock().await;
        self.undeploy_locked(channel_ids).await;
        Ok(())
    }

    pub async fn undeploy_all_channels(&self) -> Result<()> {
        let _deploy = self.deploy_lock.lock().await;
        let ids = self.deployed_channel_ids();
        self.undeploy_locked(&ids).await;
        Ok(())
    }

    async fn undeploy_locked(&self, channel_ids: &[String]) {
        for channel_id in channel_ids {
            if let Err(e) = self.undeploy_one(channel_id).await {
                self.report(channel_id, &e);
            }
        }
    }

    async fn undeploy_one(&self, channel_id: &str) -> Result<()> {
        let Some(channel) = self.channel(channel_id) else {
            debug!(channel_id, "ENGINE: Channel not deployed, nothing to undeploy");
            return Ok(());
        };

        if let Err(e) = channel.stop().await {
            self.report(channel_id, &e);
            warn!(channel_id, "ENGINE: Halting channel after failed stop");
            if let Err(halt) = channel.halt().await {
                self.report(channel_id, &halt);
            }
        }

        let result = channel.undeploy().await;
        self.channels.remove(channel_id);
        log_channel_operation("undeploy", channel_id, Some(channel.revision()), "undeployed", None);
        result
    }

    /// Undeploy everything, clear shared scratch state, deploy everything.
    ///
    /// An interruption is returned as a fatal error.
    pub async fn redeploy_all_channels(&self) -> Result<()> {
        let _deploy = self.deploy_lock.lock().await;
        info!("ENGINE: Redeploying all channels");

        let deployed = self.deployed_channel_ids();
        self.undeploy_locked(&deployed).await;
        self.check_interrupted("redeploy")?;

        if self.context.config.clear_global_map {
            self.context.global_map.clear();
        }

        let ids = self.enabled_channel_ids().await?;
        self.check_interrupted("redeploy")?;
        self.deploy_locked(&ids).await
    }

    /// Start a deployed channel; a channel that is not deployed is a no-op
    pub async fn start_channel(&self, channel_id: &str) -> Result<()> {
        let Some(channel) = self.channel(channel_id) else {
            debug!(channel_id, "ENGINE: Start ignored, channel not deployed");
            return Ok(());
        };
        self.reported(channel_id, channel.start().await)
    }

    /// Stop a deployed channel; a channel that is not deployed is a no-op
    pub async fn stop_channel(&self, channel_id: &str) -> Result<()> {
        let Some(channel) = self.channel(channel_id) else {
            debug!(channel_id, "ENGINE: Stop ignored, channel not deployed");
            return Ok(());
        };
        self.reported(channel_id, channel.stop().await)
    }

    pub async fn pause_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.deployed(channel_id)?;
        self.reported(channel_id, channel.pause().await)
    }

    pub async fn resume_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.deployed(channel_id)?;
        self.reported(channel_id, channel.resume().await)
    }

    pub async fn halt_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.deployed(channel_id)?;
        self.reported(channel_id, channel.halt().await)
    }

    pub async fn start_connector(&self, channel_id: &str, metadata_id: u32) -> Result<()> {
        let channel = self.deployed(channel_id)?;
        let result = self.reported(channel_id, channel.start_connector(metadata_id).await);
        log_connector_operation("start", channel_id, metadata_id, status_label(&result), None);
        result
    }

    pub async fn stop_connector(&self, channel_id: &str, metadata_id: u32) -> Result<()> {
        let channel = self.deployed(channel_id)?;
        let result = self.reported(channel_id, channel.stop_connector(metadata_id).await);
        log_connector_operation("stop", channel_id, metadata_id, status_label(&result), None);
        result
    }

    /// Dispatch entry point for callers and push-style source transports
    pub async fn dispatch_raw_message(
        &self,
        channel_id: &str,
        raw: RawMessage,
        force: bool,
    ) -> Result<DispatchResult> {
        let channel = self.deployed(channel_id)?;
        channel.dispatch(raw, force).await
    }

    /// Dashboard rows for the given channels (all when `None`), oldest deployment first
    pub async fn get_channel_status_list(&self, channel_ids: Option<&[String]>) -> Vec<DashboardStatus> {
        let channels: Vec<Arc<Channel>> = match channel_ids {
            Some(ids) => ids.iter().filter_map(|id| self.channel(id)).collect(),
            None => self.channels.iter().map(|c| Arc::clone(c.value())).collect(),
        };

        let mut statuses = Vec::with_capacity(channels.len());
        for channel in channels {
            let stored_revision = self.context.repository.revision(channel.id()).await;
            statuses.push(DashboardStatus::from_channel(
                &channel,
                stored_revision,
                &self.context.statistics,
            ));
        }
        statuses.sort_by(|a, b| {
            a.deployed_at
                .cmp(&b.deployed_at)
                .then_with(|| a.channel_id.cmp(&b.channel_id))
        });
        statuses
    }

    pub async fn get_channel_status(&self, channel_id: &str) -> Option<DashboardStatus> {
        let channel = self.channel(channel_id)?;
        let stored_revision = self.context.repository.revision(channel_id).await;
        Some(DashboardStatus::from_channel(
            &channel,
            stored_revision,
            &self.context.statistics,
        ))
    }

    /// Reset current statistics; lifetime statistics are kept
    pub fn reset_statistics(&self, channel_id: &str, metadata_ids: Option<&[u32]>) {
        self.context.statistics.reset(channel_id, metadata_ids);
        debug!(channel_id, "ENGINE: Statistics reset");
    }
}

fn status_label<T>(result: &Result<T>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "failed"
    }
}

#[async_trait]
impl MessageRouter for EngineController {
    async fn route(&self, channel_id: &str, body: String) -> Result<()> {
        self.dispatch_raw_message(channel_id, RawMessage::new(body), false)
            .await
            .map(|_| ())
    }
}
