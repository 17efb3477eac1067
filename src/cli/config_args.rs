use clap::{Args, Subcommand};

/// Configuration management arguments.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Set a configuration value.
    Set {
        /// Dot-separated configuration key (e.g. `aligner.min_match_ms`).
        key: String,
        /// New value.
        value: String,
    },
    /// Get a configuration value.
    Get {
        /// Dot-separated configuration key.
        key: String,
    },
    /// List all configuration values.
    List,
    /// Reset configuration to defaults.
    Reset,
}
