//! Request command implementation.

use std::io::{IsTerminal, Read};

use crate::cli::args::{OutputFormat, RequestArgs};
use crate::core::{Message, Orchestrator, RequestOptions};
use crate::error::{Result, RouterError};
use crate::render;

/// Execute the request command.
pub async fn execute(
    router: &Orchestrator,
    args: &RequestArgs,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    args.validate()?;

    let prompt = match &args.prompt {
        Some(prompt) => prompt.clone(),
        None => read_stdin_prompt()?,
    };
    if prompt.trim().is_empty() {
        return Err(RouterError::Config(
            "prompt is empty: pass --prompt or pipe text on stdin".to_string(),
        ));
    }

    let messages = build_messages(args.system.as_deref(), prompt);
    let options = build_options(args);

    tracing::debug!(
        messages = messages.len(),
        max_tokens = options.max_tokens,
        "Sending request"
    );
    let printed = router
        .request(&messages, &options)
        .await
        .and_then(|completion| {
            let output = render::render_completion(&completion, format, pretty, no_color)?;
            println!("{}", output.trim_end());
            Ok(())
        });

    // The process exits after this command; let a probe started by the
    // request record its outcome first.
    router.wait_for_recovery_probe().await;
    printed
}

fn read_stdin_prompt() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(RouterError::Config(
            "no prompt given: pass --prompt or pipe text on stdin".to_string(),
        ));
    }
    let mut prompt = String::new();
    stdin.read_to_string(&mut prompt)?;
    Ok(prompt)
}

fn build_messages(system: Option<&str>, prompt: String) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}

fn build_options(args: &RequestArgs) -> RequestOptions {
    let defaults = RequestOptions::default();
    RequestOptions {
        max_tokens: args.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: args.temperature.unwrap_or(defaults.temperature),
        model: args.model.clone(),
    }
}
