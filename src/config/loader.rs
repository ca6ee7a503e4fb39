//! Configuration Loader
//!
//! Environment-aware loading of `tiered-cache.yaml`. The base document is
//! merged with the section named after the active environment (`test`,
//! `development`, `production`), then `TIERED_CACHE_*` overrides apply.

use super::error::{ConfigResult, ConfigurationError};
use super::{detect_environment, CacheConfig};
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["tiered-cache.yaml", "tiered-cache.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Loaded cache configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: CacheConfig,
    environment: String,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Load configuration from `./config` with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful in tests that must not touch process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));
        let config_file = Self::find_config_file(&config_directory)?;
        Self::load_file_with_env(&config_file, environment)
    }

    /// Load a specific file with explicit environment
    pub fn load_file_with_env(
        config_file: &Path,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            environment = environment,
            path = %config_file.display(),
            "Loading cache configuration"
        );

        let config = Self::load_and_merge_config(config_file, environment)?.with_env_overrides();
        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = environment,
            namespace = %config.namespace,
            shared_backend = %config.shared_tier.backend,
            "Cache configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file: config_file.to_path_buf(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the environment the configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Path of the file that was loaded
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Configuration as JSON with credentials in URLs masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn load_and_merge_config(config_file: &Path, environment: &str) -> ConfigResult<CacheConfig> {
        let yaml_content = Self::read_config_file_safely(config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        // An empty file is a valid all-defaults configuration
        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(environment = environment, "Applying environment-specific overrides");
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge environment overrides into the base document
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            // An empty environment section overrides nothing
            (_, YamlValue::Null) => {}
            (YamlValue::Mapping(_), other) => {
                return Err(ConfigurationError::ConfigMergeError {
                    error: format!("environment section must be a mapping, got {other:?}"),
                });
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }

    fn sanitize_config_for_logging(config: &CacheConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        if let Some(url) = config_json
            .get_mut("shared_tier")
            .and_then(|tier| tier.get_mut("url"))
        {
            if let Some(raw) = url.as_str() {
                *url = serde_json::Value::String(crate::logging::redact_url(raw));
            }
        }
        config_json
    }
}
