//! Configuration service system for dependency injection and test isolation.
//!
//! This module provides a clean abstraction for configuration management
//! that enables dependency injection and complete test isolation without
//! requiring unsafe code or global state resets.

use crate::config::{Config, EnvironmentProvider, SystemEnvironmentProvider};
use crate::{Result, error::AlignError};
use config::{Config as ConfigCrate, ConfigBuilder, Environment, File, builder::DefaultState};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service trait for dependency injection.
///
/// This trait abstracts configuration loading and reloading operations,
/// allowing different implementations for production and testing environments.
pub trait ConfigService: Send + Sync {
    /// Get the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or validation fails.
    fn get_config(&self) -> Result<Config>;

    /// Reload configuration from sources, discarding any cached values.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration reloading fails.
    fn reload(&self) -> Result<()>;

    /// Save current configuration to the default file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    fn save_config(&self) -> Result<()>;

    /// Save configuration to a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if TOML serialization or the file write fails.
    fn save_config_to_file(&self, path: &Path) -> Result<()>;

    /// Get the default configuration file path.
    fn get_config_file_path(&self) -> Result<PathBuf>;

    /// Get a specific configuration value by dot-separated key path
    /// (e.g. `"aligner.min_match_ms"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not recognized.
    fn get_config_value(&self, key: &str) -> Result<String>;

    /// Reset configuration to default values.
    ///
    /// # Errors
    ///
    /// Returns an error if save or reload fails.
    fn reset_to_defaults(&self) -> Result<()>;

    /// Set a specific configuration value by dot-separated key path.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value fails to parse, or
    /// persistence fails.
    fn set_config_value(&self, key: &str, value: &str) -> Result<()>;
}

/// Production configuration service implementation.
///
/// Loads configuration from multiple sources in order of priority:
/// 1. `ALIGN_`-prefixed environment variables (highest priority)
/// 2. User configuration file
/// 3. Default configuration file (lowest priority)
pub struct ProductionConfigService {
    config_builder: ConfigBuilder<DefaultState>,
    cached_config: Arc<RwLock<Option<Config>>>,
    env_provider: Arc<dyn EnvironmentProvider>,
}

impl ProductionConfigService {
    /// Create a configuration service using the default environment variable provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration builder cannot be initialized.
    pub fn new() -> Result<Self> {
        Self::with_env_provider(Arc::new(SystemEnvironmentProvider::new()))
    }

    /// Create a configuration service using the specified environment variable provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration builder cannot be initialized.
    pub fn with_env_provider(env_provider: Arc<dyn EnvironmentProvider>) -> Result<Self> {
        let config_file_path = if let Some(custom_path) = env_provider.get_var("ALIGN_CONFIG_PATH")
        {
            PathBuf::from(custom_path)
        } else {
            Self::user_config_path()
        };

        let config_builder = ConfigCrate::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::from(config_file_path).required(false))
            .add_source(Environment::with_prefix("ALIGN").separator("_"));

        Ok(Self {
            config_builder,
            cached_config: Arc::new(RwLock::new(None)),
            env_provider,
        })
    }

    /// Add an additional configuration source file (highest priority is still
    /// environment variables, applied on load).
    pub fn with_custom_file(mut self, file_path: PathBuf) -> Result<Self> {
        self.config_builder = self.config_builder.add_source(File::from(file_path));
        Ok(self)
    }

    fn user_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scriptalign")
            .join("config.toml")
    }

    fn load_and_validate(&self) -> Result<Config> {
        debug!("ProductionConfigService: loading configuration from sources");

        let config_crate = self.config_builder.build_cloned().map_err(|e| {
            debug!("ProductionConfigService: config build failed: {}", e);
            AlignError::config(format!("Failed to build configuration: {}", e))
        })?;

        let mut app_config = config_crate
            .try_deserialize::<Config>()
            .unwrap_or_else(|e| {
                debug!(
                    "ProductionConfigService: full deserialization failed ({}), using defaults",
                    e
                );
                Config::default()
            });

        if app_config.asr.api_key.is_none() {
            if let Some(api_key) = self.env_provider.get_var("ASR_API_KEY") {
                debug!("ProductionConfigService: found ASR_API_KEY environment variable");
                app_config.asr.api_key = Some(api_key);
            }
        }

        validate_config(&app_config).map_err(|e| {
            debug!("ProductionConfigService: config validation failed: {}", e);
            AlignError::config(format!("Configuration validation failed: {}", e))
        })?;

        Ok(app_config)
    }

    fn set_value_internal(&self, config: &mut Config, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["general", "device"] => config.general.device = value.to_string(),
            ["general", "language"] => config.general.language = Some(value.to_string()),
            ["general", "mode"] => {
                config.general.mode = match value {
                    "default" => crate::config::Mode::Default,
                    "manga" => crate::config::Mode::Manga,
                    other => {
                        return Err(AlignError::config(format!("Unknown mode: {}", other)));
                    }
                }
            }
            ["general", "text_parts_path"] => {
                config.general.text_parts_path = Some(value.to_string())
            }
            ["sentence", "min_chars"] => {
                config.sentence.min_chars = parse_usize(key, value)?;
            }
            ["sentence", "min_chars_arabic"] => {
                config.sentence.min_chars_arabic = parse_usize(key, value)?;
            }
            ["sentence", "min_tokens"] => {
                config.sentence.min_tokens = parse_usize(key, value)?;
            }
            ["chunker", "chunk_limit"] => {
                config.chunker.chunk_limit = parse_usize(key, value)?;
            }
            ["aligner", "min_match_ms"] => {
                config.aligner.min_match_ms = parse_i64(key, value)?;
            }
            ["aligner", "normal_threshold"] => {
                config.aligner.normal_threshold = parse_f64(key, value)?;
            }
            ["aligner", "aggressive_threshold"] => {
                config.aligner.aggressive_threshold = parse_f64(key, value)?;
            }
            ["recovery", "anchor_search_span"] => {
                config.recovery.anchor_search_span = parse_usize(key, value)?;
            }
            ["progress", "max_retries"] => {
                config.progress.max_retries = parse_u32(key, value)?;
            }
            ["orchestrator", "asr_workers"] => {
                config.orchestrator.asr_workers = parse_usize(key, value)?;
            }
            ["orchestrator", "min_free_vram_gb"] => {
                config.orchestrator.min_free_vram_gb = Some(parse_f64(key, value)?);
            }
            ["orchestrator", "asr_prompt"] => {
                config.orchestrator.asr_prompt = Some(value.to_string());
            }
            ["orchestrator", "asr_prompt_max_chars"] => {
                config.orchestrator.asr_prompt_max_chars = parse_usize(key, value)?;
            }
            ["asr", "provider"] => config.asr.provider = value.to_string(),
            ["asr", "base_url"] => config.asr.base_url = value.to_string(),
            ["asr", "api_key"] => {
                config.asr.api_key = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            ["asr", "model"] => config.asr.model = value.to_string(),
            _ => {
                return Err(AlignError::config(format!(
                    "Unknown configuration key: {}",
                    key
                )));
            }
        }
        Ok(())
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| AlignError::config(format!("Invalid numeric value for {}: {}", key, value)))
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| AlignError::config(format!("Invalid numeric value for {}: {}", key, value)))
}

fn parse_i64(key: &str, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| AlignError::config(format!("Invalid numeric value for {}: {}", key, value)))
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| AlignError::config(format!("Invalid numeric value for {}: {}", key, value)))
}

/// Validate cross-field invariants of a loaded configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.aligner.normal_threshold < 0.0 || config.aligner.normal_threshold > 100.0 {
        return Err(AlignError::config(
            "aligner.normal_threshold must be within 0..=100",
        ));
    }
    if config.aligner.aggressive_threshold < 0.0 || config.aligner.aggressive_threshold > 100.0 {
        return Err(AlignError::config(
            "aligner.aggressive_threshold must be within 0..=100",
        ));
    }
    if config.aligner.min_match_ms < 0 {
        return Err(AlignError::config("aligner.min_match_ms must be >= 0"));
    }
    if config.sentence.min_chars == 0 {
        return Err(AlignError::config("sentence.min_chars must be > 0"));
    }
    Ok(())
}

impl ConfigService for ProductionConfigService {
    fn get_config(&self) -> Result<Config> {
        if let Some(cached) = self.cached_config.read().unwrap().as_ref() {
            return Ok(cached.clone());
        }
        let config = self.load_and_validate()?;
        *self.cached_config.write().unwrap() = Some(config.clone());
        Ok(config)
    }

    fn reload(&self) -> Result<()> {
        let config = self.load_and_validate()?;
        *self.cached_config.write().unwrap() = Some(config);
        Ok(())
    }

    fn save_config(&self) -> Result<()> {
        let path = self.get_config_file_path()?;
        self.save_config_to_file(&path)
    }

    fn save_config_to_file(&self, path: &Path) -> Result<()> {
        let config = self.get_config()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| AlignError::config(format!("Failed to serialize configuration: {}", e)))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = self.env_provider.get_var("ALIGN_CONFIG_PATH") {
            Ok(PathBuf::from(custom_path))
        } else {
            Ok(Self::user_config_path())
        }
    }

    fn get_config_value(&self, key: &str) -> Result<String> {
        let config = self.get_config()?;
        get_value_as_string(&config, key)
    }

    fn reset_to_defaults(&self) -> Result<()> {
        let default_config = Config::default();
        *self.cached_config.write().unwrap() = Some(default_config);
        self.save_config()
    }

    fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        let mut config = self.get_config()?;
        self.set_value_internal(&mut config, key, value)?;
        validate_config(&config)?;
        *self.cached_config.write().unwrap() = Some(config);
        self.save_config()
    }
}

/// Read a configuration field by dot-separated key path as a display string.
///
/// Shared between [`ProductionConfigService`] and [`crate::config::TestConfigService`].
pub(crate) fn get_value_as_string(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();
    Ok(match parts.as_slice() {
        ["general", "device"] => config.general.device.clone(),
        ["general", "language"] => config.general.language.clone().unwrap_or_default(),
        ["general", "mode"] => config.general.mode.to_string(),
        ["general", "text_parts_path"] => config.general.text_parts_path.clone().unwrap_or_default(),
        ["sentence", "min_chars"] => config.sentence.min_chars.to_string(),
        ["sentence", "min_chars_arabic"] => config.sentence.min_chars_arabic.to_string(),
        ["sentence", "min_tokens"] => config.sentence.min_tokens.to_string(),
        ["chunker", "chunk_limit"] => config.chunker.chunk_limit.to_string(),
        ["aligner", "min_match_ms"] => config.aligner.min_match_ms.to_string(),
        ["aligner", "normal_threshold"] => config.aligner.normal_threshold.to_string(),
        ["aligner", "aggressive_threshold"] => config.aligner.aggressive_threshold.to_string(),
        ["recovery", "anchor_search_span"] => config.recovery.anchor_search_span.to_string(),
        ["progress", "max_retries"] => config.progress.max_retries.to_string(),
        ["orchestrator", "asr_workers"] => config.orchestrator.asr_workers.to_string(),
        ["orchestrator", "min_free_vram_gb"] => config
            .orchestrator
            .min_free_vram_gb
            .map(|v| v.to_string())
            .unwrap_or_default(),
        ["asr", "provider"] => config.asr.provider.clone(),
        ["asr", "base_url"] => config.asr.base_url.clone(),
        ["asr", "model"] => config.asr.model.clone(),
        _ => {
            return Err(AlignError::config(format!(
                "Unknown configuration key: {}",
                key
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestEnvironmentProvider;

    #[test]
    fn test_config_service_creation() {
        let service = ProductionConfigService::new();
        assert!(service.is_ok());
    }

    #[test]
    fn test_get_config_returns_defaults_without_files() {
        let env = Arc::new(TestEnvironmentProvider::new());
        let service = ProductionConfigService::with_env_provider(env).unwrap();
        let config = service.get_config().unwrap();
        assert_eq!(config.aligner.min_match_ms, 200);
    }

    #[test]
    fn test_get_config_value_known_key() {
        let env = Arc::new(TestEnvironmentProvider::new());
        let service = ProductionConfigService::with_env_provider(env).unwrap();
        let value = service.get_config_value("aligner.normal_threshold").unwrap();
        assert_eq!(value, "75");
    }

    #[test]
    fn test_get_config_value_unknown_key() {
        let env = Arc::new(TestEnvironmentProvider::new());
        let service = ProductionConfigService::with_env_provider(env).unwrap();
        assert!(service.get_config_value("nonexistent.key").is_err());
    }

    #[test]
    fn test_validate_config_rejects_bad_threshold() {
        let mut config = Config::default();
        config.aligner.normal_threshold = 150.0;
        assert!(validate_config(&config).is_err());
    }
}
