//! Reset command implementation.

use crate::cli::args::{OutputFormat, ResetArgs};
use crate::core::Orchestrator;
use crate::error::{Result, RouterError};
use crate::render::robot;

/// Execute the reset command.
///
/// # Errors
///
/// Refuses to run without `--yes`.
pub fn execute(
    router: &Orchestrator,
    args: &ResetArgs,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    if !args.yes {
        return Err(RouterError::Config(
            "reset clears fallback state, usage counters and the current quota window; \
             pass --yes to confirm"
                .to_string(),
        ));
    }

    router.reset()?;

    match format {
        OutputFormat::Json => {
            let data = serde_json::json!({
                "reset": true,
                "activeProvider": router.provider_state().active_provider,
            });
            let output = robot::render_envelope("reset", &data, pretty)?;
            println!("{output}");
        }
        OutputFormat::Human | OutputFormat::Md => println!("Router state reset."),
    }
    Ok(())
}
