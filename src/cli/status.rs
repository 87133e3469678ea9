//! Status command implementation.

use crate::cli::args::OutputFormat;
use crate::core::Orchestrator;
use crate::error::Result;
use crate::render;

/// Execute the status command.
pub fn execute(
    router: &Orchestrator,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let status = router.status()?;
    tracing::debug!(
        active = %status.active_provider,
        fallback = status.fallback_active,
        usage = status.quota_usage_percent,
        "Status collected"
    );

    let output = render::render_status(&status, format, pretty, no_color)?;
    println!("{}", output.trim_end());
    Ok(())
}
