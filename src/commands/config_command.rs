//! Configuration management command implementation.
//!
//! Provides the `config` subcommand: view, set, list, and reset the
//! persisted alignment-engine configuration (device, language, mode,
//! sentence/chunker/aligner/recovery/progress/orchestrator sections, and
//! the ASR provider connection settings).

use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::ConfigService;
use crate::error::AlignError;
use crate::Result;

/// Execute a configuration management operation.
pub async fn execute(args: ConfigArgs, config_service: &dyn ConfigService) -> Result<()> {
    match args.action {
        ConfigAction::Set { key, value } => {
            config_service.set_config_value(&key, &value)?;
            println!("✓ Configuration '{}' set to '{}'", key, value);
            if let Ok(current) = config_service.get_config_value(&key) {
                println!("  Current value: {}", current);
            }
            if let Ok(path) = config_service.get_config_file_path() {
                println!("  Saved to: {}", path.display());
            }
        }
        ConfigAction::Get { key } => {
            let value = config_service.get_config_value(&key)?;
            println!("{}", value);
        }
        ConfigAction::List => {
            let config = config_service.get_config()?;
            if let Ok(path) = config_service.get_config_file_path() {
                println!("# Configuration file path: {}\n", path.display());
            }
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| AlignError::config(format!("TOML serialization error: {}", e)))?
            );
        }
        ConfigAction::Reset => {
            config_service.reset_to_defaults()?;
            println!("Configuration reset to default values");
            if let Ok(path) = config_service.get_config_file_path() {
                println!("Default configuration saved to: {}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigAction;
    use crate::config::TestConfigService;

    #[tokio::test]
    async fn test_execute_get() {
        let service = TestConfigService::with_defaults();
        let args = ConfigArgs {
            action: ConfigAction::Get {
                key: "aligner.min_match_ms".to_string(),
            },
        };
        assert!(execute(args, &service).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_list() {
        let service = TestConfigService::with_defaults();
        let args = ConfigArgs {
            action: ConfigAction::List,
        };
        assert!(execute(args, &service).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_get_unknown_key() {
        let service = TestConfigService::with_defaults();
        let args = ConfigArgs {
            action: ConfigAction::Get {
                key: "nonexistent.key".to_string(),
            },
        };
        assert!(execute(args, &service).await.is_err());
    }
}
