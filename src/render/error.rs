//! Error rendering for llm-router.
//!
//! Plain text with the first fix command for terminals, structured JSON for
//! machine consumers.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::RouterError;

/// Render an error for the selected output format.
#[must_use]
pub fn render_error(
    error: &RouterError,
    format: OutputFormat,
    no_color: bool,
    pretty: bool,
) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Md => render_error_json(error, true),
        OutputFormat::Human => render_simple(error, no_color),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &RouterError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error, true))
}

fn render_simple(error: &RouterError, no_color: bool) -> String {
    let header = format!("Error [{}]: {}", error.error_code(), error);
    let mut lines = vec![if no_color {
        header
    } else {
        header.red().bold().to_string()
    }];

    let suggestions = error.fix_suggestions();
    if let Some(suggestion) = suggestions.first() {
        lines.push(suggestion.context.clone());
        if let Some(cmd) = suggestion.commands.first() {
            lines.push(format!("Fix: {cmd}"));
        }
    }

    lines.join("\n")
}

/// JSON representation of an error for machine consumption.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    error_code: String,
    category: String,
    message: String,
    is_retryable: bool,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    suggestions: Vec<SuggestionJson>,
}

#[derive(serde::Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &RouterError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            exit_code: error.exit_code().into(),
            provider: error.provider().map(|p| p.cli_name().to_string()),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                })
                .collect(),
        }
    }
}
