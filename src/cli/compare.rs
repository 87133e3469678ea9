//! Compare command implementation.

use crate::cli::args::OutputFormat;
use crate::core::Orchestrator;
use crate::error::Result;
use crate::render;

/// Execute the compare command.
pub fn execute(
    router: &Orchestrator,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let comparison = router.compare_providers();
    let output = render::render_comparison(&comparison, format, pretty, no_color)?;
    println!("{}", output.trim_end());
    Ok(())
}
