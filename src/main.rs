//! llm-router - Resilient multi-backend request router
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use llm_router::cli::{Cli, Commands};
use llm_router::core::{Orchestrator, logging};
use llm_router::storage::ResolvedConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (env_level, env_format, log_file) = logging::settings_from_env();
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or(env_level)
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        env_format.unwrap_or_default()
    };
    logging::init(log_level, log_format, log_file, cli.verbose);

    let format = cli.effective_format();
    let pretty = cli.pretty;
    let no_color = !llm_router::util::env::should_use_color(cli.no_color);

    match run(cli, no_color).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let output = llm_router::render::error::render_error(&e, format, no_color, pretty);
            eprintln!("{output}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli, no_color: bool) -> llm_router::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let config = ResolvedConfig::resolve(&cli.overrides())?;

    match &cli.command {
        Commands::Config(command) => {
            llm_router::cli::config::execute(command, &config, format, pretty, no_color)
        }
        Commands::Status => {
            let router = Orchestrator::new(&config)?;
            llm_router::cli::status::execute(&router, format, pretty, no_color)
        }
        Commands::Request(args) => {
            let router = Orchestrator::new(&config)?;
            llm_router::cli::request::execute(&router, args, format, pretty, no_color).await
        }
        Commands::Reset(args) => {
            let router = Orchestrator::new(&config)?;
            llm_router::cli::reset::execute(&router, args, format, pretty)
        }
        Commands::Compare => {
            let router = Orchestrator::new(&config)?;
            llm_router::cli::compare::execute(&router, format, pretty, no_color)
        }
    }
}
