//! Configuration Loader
//!
//! Environment-aware loading: `scribe.toml`, then `scribe.{environment}.toml`,
//! then `SCRIBE__SECTION__FIELD` environment variables, later sources winning.
//! Missing files are skipped; the merged result is validated.

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::ScribeConfig;

pub struct ConfigManager {
    config: ScribeConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration from `./config` with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            poll_interval_ms = config.publish.poll_interval_ms,
            running_timeout_seconds = config.publish.running_timeout_seconds,
            max_level = ?config.tree.max_level,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ScribeConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from `SCRIBE_ENV`, then `APP_ENV`, else development
    pub fn detect_environment() -> String {
        env::var("SCRIBE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn build(directory: &Path, environment: &str) -> ConfigResult<ScribeConfig> {
        let base = directory.join("scribe.toml");
        let overlay = directory.join(format!("scribe.{environment}.toml"));

        let settings = Config::builder()
            .add_source(File::from(base.as_path()).required(false))
            .add_source(File::from(overlay.as_path()).required(false))
            .add_source(
                Environment::with_prefix("SCRIBE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_failed(directory.display().to_string(), e))?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_failed(directory.display().to_string(), e))
    }
}
