//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. A base file is
//! merged with an optional environment overlay and environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_ENV_PREFIX: &str = "COURIER";

#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load from a file with environment auto-detection
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_file(path, &environment)
    }

    /// Load from a file for an explicit environment
    pub fn load_from_file(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_prefix(path, environment, DEFAULT_ENV_PREFIX)
    }

    /// Load with a custom environment variable prefix (`<PREFIX>__FIELD__NESTED`)
    pub fn load_with_prefix(
        path: impl AsRef<Path>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let overlay = Self::overlay_path(path, environment);
        debug!(
            base = %path.display(),
            overlay = ?overlay.as_ref().map(|p| p.display().to_string()),
            environment,
            "Loading engine configuration"
        );

        let mut builder = config::Config::builder()
            .set_default("environment", environment)
            .map_err(|e| ConfigurationError::parse_error(path.display().to_string(), e))?
            .add_source(config::File::from(path.to_path_buf()).required(true));

        if let Some(overlay) = &overlay {
            builder = builder.add_source(config::File::from(overlay.clone()).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::parse_error(path.display().to_string(), e))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::parse_error(path.display().to_string(), e))?;

        config.validate()?;

        info!(
            environment = %config.environment,
            queue_buffer_size = config.queue_buffer_size,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            source_path: Some(path.to_path_buf()),
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            source_path: None,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// `COURIER_ENV`, then `APP_ENV`, then `development`
    pub fn detect_environment() -> String {
        env::var("COURIER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `courier.yaml` + `test` resolves to `courier.test.yaml` next to it
    fn overlay_path(path: &Path, environment: &str) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let file_name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{environment}.{ext}"),
            None => format!("{stem}.{environment}"),
        };
        let overlay = path.with_file_name(file_name);
        overlay.is_file().then_some(overlay)
    }
}
