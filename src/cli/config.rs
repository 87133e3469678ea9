//! Config command implementation.

use std::path::PathBuf;

use crate::cli::args::{ConfigCommand, OutputFormat};
use crate::error::Result;
use crate::render;
use crate::storage::{Config, ENV_CONFIG, ResolvedConfig};

/// Execute a config subcommand.
pub fn execute(
    command: &ConfigCommand,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let output = render::render_config(config, format, pretty, no_color)?;
            println!("{}", output.trim_end());
        }
        ConfigCommand::Path => {
            let path = crate::util::env::non_empty_var(ENV_CONFIG)
                .map_or_else(Config::config_path, PathBuf::from);
            println!("{}", path.display());
        }
    }
    Ok(())
}
