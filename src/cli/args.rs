//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{Result, RouterError};
use crate::storage::CliOverrides;

/// Resilient multi-backend request router.
#[derive(Parser, Debug)]
#[command(name = "llm-router")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSON logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for persisted router state
    #[arg(long, value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    /// Configuration values supplied as flags.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            state_dir: self.state_dir.clone(),
            timeout_seconds: self.timeout,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show routing, quota and cost status
    Status,

    /// Send one request through the router
    Request(RequestArgs),

    /// Clear router state back to defaults
    Reset(ResetArgs),

    /// Compare subscription and metered monthly cost
    Compare,

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for the `request` command.
#[derive(Parser, Debug, Default)]
pub struct RequestArgs {
    /// Prompt text (read from stdin when omitted)
    #[arg(long, short)]
    pub prompt: Option<String>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Maximum tokens to generate
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 1.0)
    #[arg(long, value_name = "T")]
    pub temperature: Option<f32>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,
}

impl RequestArgs {
    /// Validate argument combinations.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == Some(0) {
            return Err(RouterError::Config(
                "--max-tokens must be greater than zero".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(RouterError::Config(format!(
                    "--temperature must be between 0.0 and 1.0, got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// Arguments for the `reset` command.
#[derive(Parser, Debug, Default)]
pub struct ResetArgs {
    /// Confirm the reset
    #[arg(long)]
    pub yes: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration and where each value came from
    Show,
    /// Print the config file path
    Path,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Markdown output
    Md,
}
