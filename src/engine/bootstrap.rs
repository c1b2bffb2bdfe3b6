//! # Engine Bootstrap
//!
//! Wires the engine controller and the alert controller to one shared
//! [`EngineContext`] and drives whole-engine startup and shutdown.
//!
//! ```rust,no_run
//! use courier_core::config::EngineConfig;
//! use courier_core::engine::EngineBootstrap;
//!
//! # async fn example() -> courier_core::error::Result<()> {
//! let bootstrap = EngineBootstrap::from_config(EngineConfig::default(), |builder| builder)?;
//! bootstrap.start_engine(Vec::new()).await?;
//! bootstrap.stop_engine().await?;
//! # Ok(())
//! # }
//! ```

use super::context::{EngineContext, EngineContextBuilder};
use super::controller::EngineController;
use crate::alert::{AlertController, AlertModel, MessageRouter};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::logging::log_error;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct EngineBootstrap {
    context: Arc<EngineContext>,
    engine: Arc<EngineController>,
    alerts: Arc<AlertController>,
}

impl EngineBootstrap {
    /// Validate the configuration and build a context through `configure`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config<F>(config: EngineConfig, configure: F) -> Result<Self>
    where
        F: FnOnce(EngineContextBuilder) -> EngineContextBuilder,
    {
        config.validate()?;
        let context = configure(EngineContext::builder(config)).build();
        Ok(Self::from_context(Arc::new(context)))
    }

    pub fn from_context(context: Arc<EngineContext>) -> Self {
        let engine = Arc::new(EngineController::new(Arc::clone(&context)));
        let alerts = Arc::new(AlertController::new(
            Arc::clone(&context.events),
            &context.config.alerts,
        ));
        let router: Arc<dyn MessageRouter> = Arc::clone(&engine) as Arc<dyn MessageRouter>;
        alerts.set_router(&router);

        Self {
            context,
            engine,
            alerts,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn engine(&self) -> &Arc<EngineController> {
        &self.engine
    }

    pub fn alerts(&self) -> &Arc<AlertController> {
        &self.alerts
    }

    /// Enable alerts, then deploy every enabled channel.
    ///
    /// Alerts that fail to enable are logged and do not block deployment.
    pub async fn start_engine(&self, alerts: Vec<AlertModel>) -> Result<()> {
        info!(
            environment = %self.context.config.environment,
            "🚀 ENGINE: Starting"
        );

        if let Err(e) = self.alerts.init_alerts(alerts) {
            log_error("engine", "init_alerts", &e.to_string(), Some("alert initialization incomplete"));
        }

        self.engine.clear_interrupt();
        self.engine.deploy_all_channels().await?;

        info!(
            channels = self.engine.deployed_channel_ids().len(),
            "✅ ENGINE: Started"
        );
        Ok(())
    }

    /// Undeploy every channel, then stop alert processing
    pub async fn stop_engine(&self) -> Result<()> {
        info!("🛑 ENGINE: Stopping");
        self.engine.undeploy_all_channels().await?;
        self.alerts.shutdown();
        info!("ENGINE: Stopped");
        Ok(())
    }
}
