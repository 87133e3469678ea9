//! Fix suggestion database for router errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

use std::time::Duration;

use crate::core::models::Provider;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    /// These should be copy-paste ready for the terminal.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Generates fix suggestions for rejected credentials.
#[must_use]
pub fn unauthorized_suggestions(provider: Provider, reason: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                format!("export {}=<new credential>", provider.credential_env()),
                "llm-router config show".to_string(),
            ],
            format!(
                "The {} backend rejected its credential ({reason}). The router will \
                 not send it further requests in this process.",
                provider.display_name()
            ),
        )
        .with_prevention(match provider {
            Provider::Subscription => {
                "Subscription tokens expire; refresh the token before long unattended runs."
            }
            Provider::Metered => "Rotate API keys through the config file rather than code.",
        }),
    ]
}

/// Generates fix suggestions when no backend is configured.
#[must_use]
pub fn no_provider_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![
            format!("export {}=<oauth token>", Provider::Subscription.credential_env()),
            format!("export {}=<api key>", Provider::Metered.credential_env()),
        ],
        "Neither a subscription token nor a metered API key is configured. \
         Callers should fall back to their non-AI code path.",
    )]
}

/// Generates fix suggestions for exhausted quota or balance.
#[must_use]
pub fn quota_suggestions(provider: Provider) -> Vec<FixSuggestion> {
    match provider {
        Provider::Subscription => vec![FixSuggestion::new(
            vec!["llm-router status".to_string()],
            "The subscription quota window is used up. Requests resume when the window resets.",
        )
        .with_prevention("Configure a metered API key so requests fail over automatically.")],
        Provider::Metered => vec![FixSuggestion::new(
            vec!["llm-router compare".to_string()],
            "The metered account has insufficient balance. Top up credits to resume; \
             this is never retried automatically.",
        )],
    }
}

/// Generates fix suggestions for rate limiting.
#[must_use]
pub fn rate_limited_suggestions(retry_after: Option<Duration>) -> Vec<FixSuggestion> {
    let wait = retry_after.map_or_else(
        || "a minute".to_string(),
        |d| format!("{} seconds", d.as_secs()),
    );
    vec![FixSuggestion::new(
        vec!["llm-router status".to_string()],
        format!("The backend is rate limiting requests. Wait {wait} and try again."),
    )]
}

/// Generates fix suggestions for server and network failures.
#[must_use]
pub fn transient_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["llm-router status".to_string()],
        "The backend failed after local retries. This is usually temporary.",
    )]
}

/// Generates fix suggestions for requests a backend refused.
#[must_use]
pub fn invalid_request_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["llm-router request --help".to_string()],
        "The backend refused this request. Check the model name and shorten the prompt.",
    )
    .with_prevention("Backend health is unaffected; fix the request and send it again.")]
}

/// Generates fix suggestions for config parse errors.
#[must_use]
pub fn config_parse_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("$EDITOR {path}")],
        "The config file is not valid TOML.",
    )]
}

/// Generates fix suggestions for invalid config values.
#[must_use]
pub fn config_invalid_suggestions(key: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["llm-router config show".to_string()],
        format!("The value configured for '{key}' is out of range."),
    )]
}

/// Generates fix suggestions for corrupt state files.
#[must_use]
pub fn state_corrupt_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["llm-router reset --yes".to_string(), format!("rm {path}")],
        "A persisted state file could not be read. Resetting recreates it with defaults.",
    )]
}
