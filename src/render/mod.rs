//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use crate::cli::args::OutputFormat;
use crate::core::{Completion, CostComparison, RouterStatus};
use crate::error::Result;
use crate::storage::ResolvedConfig;

/// Render router status.
pub fn render_status(
    status: &RouterStatus,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_status(status, no_color)),
        OutputFormat::Json => robot::render_envelope("status", status, pretty),
        OutputFormat::Md => Ok(robot::render_status_md(status)),
    }
}

/// Render a completed request.
pub fn render_completion(
    completion: &Completion,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human | OutputFormat::Md => {
            Ok(human::render_completion(completion, no_color))
        }
        OutputFormat::Json => robot::render_envelope("request", completion, pretty),
    }
}

/// Render a cost comparison.
pub fn render_comparison(
    comparison: &CostComparison,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_comparison(comparison, no_color)),
        OutputFormat::Json => robot::render_envelope("compare", comparison, pretty),
        OutputFormat::Md => Ok(robot::render_comparison_md(comparison)),
    }
}

/// Render the resolved configuration with credentials masked.
pub fn render_config(
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human | OutputFormat::Md => Ok(human::render_config(config, no_color)),
        OutputFormat::Json => {
            robot::render_envelope("config", &robot::ConfigView::from_config(config), pretty)
        }
    }
}
