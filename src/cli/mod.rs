//! Command-line interface for the alignment engine.
//!
//! The CLI exposes a single primary subcommand, `align`, plus `config` for
//! inspecting/editing persisted configuration and `generate-completion` for
//! shell completion scripts.
//!
//! # Examples
//!
//! ```bash
//! # Align a text corpus against a directory of audio clips
//! scriptalign-cli align ./audio ./script.txt ./out/transcript.json
//!
//! # Resume an interrupted run
//! scriptalign-cli align ./audio ./script.txt ./out/transcript.json --resume
//! ```

mod align_args;
mod config_args;
mod generate_completion_args;
pub mod ui;

pub use align_args::{AlignArgs, ModeArg};
use clap::{Parser, Subcommand};
pub use config_args::{ConfigAction, ConfigArgs};
pub use generate_completion_args::GenerateCompletionArgs;
pub use ui::{create_progress_bar, print_error, print_success, print_warning};

/// Main CLI application structure defining the top-level interface.
#[derive(Parser, Debug)]
#[command(name = "scriptalign-cli")]
#[command(about = "Aligns a written script to ASR transcription of a sequence of audio files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Align a text corpus to the ASR transcription of a sequence of audio files.
    Align(AlignArgs),

    /// Manage and inspect application configuration.
    Config(ConfigArgs),

    /// Generate shell completion scripts.
    GenerateCompletion(GenerateCompletionArgs),
}

/// Execute the CLI application with a freshly constructed production
/// configuration service.
///
/// # Errors
///
/// Returns an error if command execution fails.
pub async fn run() -> crate::Result<()> {
    let config_service = std::sync::Arc::new(crate::config::ProductionConfigService::new()?);
    run_with_config(config_service.as_ref()).await
}

/// Run the CLI with a provided configuration service.
///
/// This enables dependency injection of configuration services for testing.
///
/// # Errors
///
/// Returns an error if command execution fails.
pub async fn run_with_config(
    config_service: &dyn crate::config::ConfigService,
) -> crate::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Align(args) => {
            // The align engine's exit contract is the printed `true`/`false`
            // line, not the process exit code: a fatal stall has already
            // been reported to the progress store and to stdout by the time
            // execute() returns an error, so the process itself always
            // exits 0. Surface the failure reason on stderr for operators.
            if let Err(e) = crate::commands::align_command::execute(args, config_service).await {
                eprintln!("{}", e.user_friendly_message());
            }
        }
        Commands::Config(args) => {
            crate::commands::config_command::execute(args, config_service).await?;
        }
        Commands::GenerateCompletion(args) => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let cmd_name = cmd.get_name().to_string();
            let mut stdout = std::io::stdout();
            clap_complete::generate(args.shell, &mut cmd, cmd_name, &mut stdout);
        }
    }
    Ok(())
}
