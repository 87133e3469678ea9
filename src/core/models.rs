//! Request/response data models and backend identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Provider
// =============================================================================

/// The two interchangeable upstream backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Flat-price subscription backend with a per-window quota (primary).
    Subscription,
    /// Pay-per-request backend (fallback).
    Metered,
}

impl Provider {
    /// All providers in routing preference order.
    pub const ALL: &'static [Self] = &[Self::Subscription, Self::Metered];

    /// CLI name for this provider.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Metered => "metered",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Subscription => "Subscription",
            Self::Metered => "Metered",
        }
    }

    /// Attempts a backend client makes before giving up on transient failures.
    #[must_use]
    pub const fn max_attempts(self) -> u32 {
        match self {
            Self::Subscription => 3,
            Self::Metered => 2,
        }
    }

    /// Primary environment variable carrying this provider's credential.
    #[must_use]
    pub const fn credential_env(self) -> &'static str {
        match self {
            Self::Subscription => "LLM_ROUTER_SUBSCRIPTION_TOKEN",
            Self::Metered => "LLM_ROUTER_METERED_API_KEY",
        }
    }

    /// Secondary environment variable checked when the primary one is unset.
    #[must_use]
    pub const fn fallback_credential_env(self) -> &'static str {
        match self {
            Self::Subscription => "CLAUDE_CODE_OAUTH_TOKEN",
            Self::Metered => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

/// Current routing target of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveProvider {
    Subscription,
    Metered,
    /// No backend is usable; callers must degrade to a non-AI path.
    #[default]
    None,
}

impl ActiveProvider {
    /// The backend this state routes to, if any.
    #[must_use]
    pub const fn backend(self) -> Option<Provider> {
        match self {
            Self::Subscription => Some(Provider::Subscription),
            Self::Metered => Some(Provider::Metered),
            Self::None => None,
        }
    }
}

impl From<Provider> for ActiveProvider {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Subscription => Self::Subscription,
            Provider::Metered => Self::Metered,
        }
    }
}

impl fmt::Display for ActiveProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend() {
            Some(p) => f.write_str(p.cli_name()),
            None => f.write_str("none"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the ordered conversation sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Caller-supplied generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Model override; the backend's configured model is used when absent.
    pub model: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            model: None,
        }
    }
}

impl RequestOptions {
    /// Minimal-cost options used for recovery probes.
    #[must_use]
    pub const fn probe() -> Self {
        Self {
            max_tokens: 1,
            temperature: 0.0,
            model: None,
        }
    }
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Successful result of a routed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    /// Backend that served the request.
    pub provider: Provider,
    /// Model that generated the content.
    pub model: String,
}

/// Transient record of one attempt against one backend.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    pub provider: Provider,
    /// 1-based attempt number within the backend client's retry loop.
    pub attempt: u32,
    pub latency: Duration,
    pub outcome: crate::core::classifier::FailureKind,
}

impl RequestAttempt {
    #[must_use]
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_retries_more_than_metered() {
        assert_eq!(Provider::Subscription.max_attempts(), 3);
        assert_eq!(Provider::Metered.max_attempts(), 2);
    }

    #[test]
    fn active_provider_serializes_lowercase() {
        let json = serde_json::to_string(&ActiveProvider::None).unwrap();
        assert_eq!(json, "\"none\"");
        assert_eq!(ActiveProvider::from(Provider::Metered).backend(), Some(Provider::Metered));
    }
}
