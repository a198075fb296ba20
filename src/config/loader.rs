//! Configuration Loader
//!
//! Environment-aware loading: base YAML, optional environment override file, then
//! environment variables, merged with the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_NAMES: [&str; 2] = ["engine.yaml", "engine.yml"];
const ENV_PREFIX: &str = "PIPELINE_ENGINE";

pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration with an explicit environment, useful for tests that must not
    /// touch process-wide environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading engine configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            lock_lease_ms = config.plan_expansion.lock_lease_ms,
            max_step_inputs_bytes = config.plan_expansion.max_step_inputs_bytes,
            "⚙️ CONFIG: Engine configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: EngineConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// `PIPELINE_ENGINE_ENV` || `APP_ENV` || `development`
    pub fn detect_environment() -> String {
        env::var("PIPELINE_ENGINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            let dir = PathBuf::from(manifest_dir).join("config");
            if dir.exists() {
                return dir;
            }
        }
        PathBuf::from("config")
    }

    fn find_base_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();
        for name in BASE_FILE_NAMES {
            let path = config_directory.join(name);
            if path.is_file() {
                debug!("Found configuration file: {}", path.display());
                return Ok(path);
            }
            searched_paths.push(path);
        }
        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<EngineConfig> {
        let base_file = Self::find_base_file(config_directory)?;
        let env_file = config_directory.join(format!("engine.{environment}.yaml"));

        if env_file.is_file() {
            debug!(
                "Applying environment-specific overrides from {}",
                env_file.display()
            );
        }

        let merged = Config::builder()
            .add_source(File::from(base_file.clone()))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(base_file.display().to_string(), e))?;

        merged.try_deserialize::<EngineConfig>().map_err(|e| {
            ConfigurationError::load_error(
                base_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }
}
