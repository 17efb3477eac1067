//! Test configuration service for isolated testing.
//!
//! This module provides a configuration service implementation specifically
//! designed for testing environments, offering complete isolation and
//! predictable configuration states.

use crate::config::service::{ConfigService, get_value_as_string};
use crate::error::AlignError;
use crate::{Result, config::Config};
use std::path::{Path, PathBuf};

/// Test configuration service implementation.
///
/// This service provides a fixed configuration for testing purposes,
/// ensuring complete isolation between tests and predictable behavior. It
/// does not load from external sources or perform file I/O.
pub struct TestConfigService {
    fixed_config: Config,
}

impl TestConfigService {
    /// Create a new test configuration service with the provided configuration.
    pub fn new(config: Config) -> Self {
        Self {
            fixed_config: config,
        }
    }

    /// Create a test configuration service with default settings.
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Create a test configuration service with a specific aligner threshold pair.
    pub fn with_aligner_thresholds(normal: f64, aggressive: f64) -> Self {
        let mut config = Config::default();
        config.aligner.normal_threshold = normal;
        config.aligner.aggressive_threshold = aggressive;
        Self::new(config)
    }

    /// Create a test configuration service with a specific chunk limit.
    pub fn with_chunk_limit(limit: usize) -> Self {
        let mut config = Config::default();
        config.chunker.chunk_limit = limit;
        Self::new(config)
    }

    /// Get the underlying configuration.
    pub fn config(&self) -> &Config {
        &self.fixed_config
    }

    /// Get a mutable reference to the underlying configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.fixed_config
    }
}

impl ConfigService for TestConfigService {
    fn get_config(&self) -> Result<Config> {
        Ok(self.fixed_config.clone())
    }

    fn reload(&self) -> Result<()> {
        Ok(())
    }

    fn save_config(&self) -> Result<()> {
        Ok(())
    }

    fn save_config_to_file(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/tmp/scriptalign_test_config.toml"))
    }

    fn get_config_value(&self, key: &str) -> Result<String> {
        get_value_as_string(&self.fixed_config, key)
    }

    fn reset_to_defaults(&self) -> Result<()> {
        Ok(())
    }

    fn set_config_value(&self, _key: &str, _value: &str) -> Result<()> {
        Err(AlignError::config(
            "TestConfigService is immutable; construct a new instance instead",
        ))
    }
}

impl Default for TestConfigService {
    fn default() -> Self {
        Self::with_defaults()
    }
}
