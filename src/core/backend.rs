//! Backend clients for the subscription and metered upstreams.
//!
//! One [`BackendClient`] exists per configured backend. `send` builds a
//! messages request, executes it, classifies the outcome and retries
//! transient failures locally with exponential backoff. Quota and auth
//! failures return immediately so the orchestrator can switch backends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};

use crate::core::classifier::{FailureKind, Outcome, classify};
use crate::core::models::{
    Completion, Message, Provider, RequestAttempt, RequestOptions, Role, TokenUsage,
};
use crate::core::quota::QuotaTracker;
use crate::error::BackendFailure;

/// Upper bound on any rate-limit wait, including server-supplied `Retry-After`.
pub const RATE_LIMIT_CEILING: Duration = Duration::from_secs(60);

/// API version header sent with every request.
const API_VERSION: &str = "2023-06-01";
/// Beta flag required for OAuth bearer tokens.
const OAUTH_BETA: &str = "oauth-2025-04-20";
const MAX_ERROR_MESSAGE_LEN: usize = 200;

// =============================================================================
// Retry policy
// =============================================================================

/// Local retry policy of one backend client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Default policy for a backend: 3 attempts for Subscription, 2 for Metered.
    #[must_use]
    pub const fn for_provider(provider: Provider, base_delay: Duration) -> Self {
        Self {
            max_attempts: provider.max_attempts(),
            base_delay,
        }
    }
}

/// Wait before the next attempt after `attempt` (1-based) failed with `kind`.
///
/// - `RateLimited`: `Retry-After` if given, else `base * 2^(attempt-1)`, capped at 60s.
/// - `ServerError` / `NetworkError`: `base * 2^(attempt-1)`, capped at `2s * attempt`.
/// - Anything else is not retried and yields zero.
#[must_use]
pub fn backoff_delay(
    kind: FailureKind,
    attempt: u32,
    base: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let exponential = base.saturating_mul(1u32 << exponent);
    match kind {
        FailureKind::RateLimited => retry_after.unwrap_or(exponential).min(RATE_LIMIT_CEILING),
        FailureKind::ServerError | FailureKind::NetworkError => {
            exponential.min(Duration::from_secs(2).saturating_mul(attempt))
        }
        FailureKind::QuotaExhausted
        | FailureKind::Unauthorized
        | FailureKind::InvalidRequest
        | FailureKind::Success => Duration::ZERO,
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<WireContent>,
    #[serde(default)]
    usage: TokenUsage,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn build_request<'a>(
    model: &'a str,
    messages: &'a [Message],
    options: &RequestOptions,
) -> WireRequest<'a> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    WireRequest {
        model,
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        messages: messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::System => return None,
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                Some(WireMessage {
                    role,
                    content: &m.content,
                })
            })
            .collect(),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
    }
}

/// Pull a readable message out of an error body.
fn error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    let mut detail: String = detail.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    if detail.is_empty() {
        detail = "empty response body".to_string();
    }
    format!("HTTP {status}: {detail}")
}

// =============================================================================
// Client
// =============================================================================

/// Result of a single attempt.
struct AttemptError {
    kind: FailureKind,
    status_code: Option<u16>,
    retry_after: Option<Duration>,
    message: String,
}

/// Executes requests against one upstream backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    provider: Provider,
    http: Client,
    base_url: String,
    credential: String,
    model: String,
    policy: RetryPolicy,
    quota: Option<Arc<QuotaTracker>>,
}

impl BackendClient {
    #[must_use]
    pub fn new(
        provider: Provider,
        http: Client,
        base_url: impl Into<String>,
        credential: impl Into<String>,
        model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: credential.into(),
            model: model.into(),
            policy,
            quota: None,
        }
    }

    /// Report every attempt to `quota`.
    #[must_use]
    pub fn with_quota(mut self, quota: Arc<QuotaTracker>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Send a request, retrying transient failures up to the policy's limit.
    ///
    /// # Errors
    ///
    /// Returns the last classified failure when the request could not be served.
    pub async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<Completion, BackendFailure> {
        self.send_with_attempts(messages, options, self.policy.max_attempts.max(1))
            .await
    }

    /// Send exactly one attempt with no local retry. Used for recovery probes.
    pub async fn send_once(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<Completion, BackendFailure> {
        self.send_with_attempts(messages, options, 1).await
    }

    async fn send_with_attempts(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        max_attempts: u32,
    ) -> Result<Completion, BackendFailure> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let body = build_request(model, messages, options);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.attempt(&body).await;
            let record = RequestAttempt {
                provider: self.provider,
                attempt,
                latency: started.elapsed(),
                outcome: result.as_ref().map_or_else(|e| e.kind, |_| FailureKind::Success),
            };
            self.report(&record);

            let err = match result {
                Ok(completion) => return Ok(completion),
                Err(err) => err,
            };

            if !err.kind.is_retryable() || attempt >= max_attempts {
                return Err(BackendFailure {
                    provider: self.provider,
                    kind: err.kind,
                    attempts: attempt,
                    status_code: err.status_code,
                    message: err.message,
                });
            }

            let delay = backoff_delay(err.kind, attempt, self.policy.base_delay, err.retry_after);
            tracing::debug!(
                provider = %self.provider,
                attempt,
                kind = %err.kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn report(&self, record: &RequestAttempt) {
        tracing::debug!(
            provider = %record.provider,
            attempt = record.attempt,
            latency_ms = record.latency_ms(),
            outcome = %record.outcome,
            "Backend attempt finished"
        );
        if let Some(quota) = &self.quota {
            let success = record.outcome == FailureKind::Success;
            if let Err(e) = quota.record_attempt(success, record.latency_ms()) {
                tracing::warn!(error = %e, "Failed to record quota attempt");
            }
        }
    }

    async fn attempt(&self, body: &WireRequest<'_>) -> Result<Completion, AttemptError> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = self
            .http
            .post(&url)
            .header("anthropic-version", API_VERSION)
            .json(body);
        let request = match self.provider {
            Provider::Subscription => request
                .bearer_auth(&self.credential)
                .header("anthropic-beta", OAUTH_BETA),
            Provider::Metered => request.header("x-api-key", &self.credential),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(AttemptError {
                    kind: classify(Outcome::from_reqwest(&e)),
                    status_code: None,
                    retry_after: None,
                    message: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Err(AttemptError {
                    kind: classify(Outcome::from_reqwest(&e)),
                    status_code: Some(status),
                    retry_after: None,
                    message: e.to_string(),
                });
            }
        };

        let kind = classify(Outcome::Http {
            status,
            body: &text,
        });
        if kind != FailureKind::Success {
            return Err(AttemptError {
                kind,
                status_code: Some(status),
                retry_after,
                message: error_message(status, &text),
            });
        }

        self.parse_completion(&text).map_err(|message| AttemptError {
            kind: FailureKind::ServerError,
            status_code: Some(status),
            retry_after: None,
            message,
        })
    }

    fn parse_completion(&self, text: &str) -> Result<Completion, String> {
        let wire: WireResponse =
            serde_json::from_str(text).map_err(|e| format!("unparseable response: {e}"))?;
        let content: String = wire
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect();

        Ok(Completion {
            content,
            usage: wire.usage,
            provider: self.provider,
            model: wire.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(FailureKind::RateLimited, 1, base, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(FailureKind::RateLimited, 2, base, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(FailureKind::RateLimited, 3, base, None), Duration::from_secs(4));
        assert_eq!(backoff_delay(FailureKind::RateLimited, 10, base, None), RATE_LIMIT_CEILING);
        assert_eq!(backoff_delay(FailureKind::RateLimited, 40, base, None), RATE_LIMIT_CEILING);
    }

    #[test]
    fn retry_after_is_honored_but_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(
            backoff_delay(FailureKind::RateLimited, 1, base, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            backoff_delay(FailureKind::RateLimited, 1, base, Some(Duration::from_secs(600))),
            RATE_LIMIT_CEILING
        );
    }

    #[test]
    fn transient_backoff_caps_at_two_seconds_per_attempt() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(FailureKind::ServerError, 1, base, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(FailureKind::NetworkError, 2, base, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(FailureKind::ServerError, 3, base, None), Duration::from_secs(4));
        assert_eq!(backoff_delay(FailureKind::ServerError, 4, base, None), Duration::from_secs(8));
        assert_eq!(backoff_delay(FailureKind::ServerError, 5, base, None), Duration::from_secs(10));
    }

    #[test]
    fn terminal_kinds_never_wait() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(FailureKind::Unauthorized, 1, base, None), Duration::ZERO);
        assert_eq!(backoff_delay(FailureKind::QuotaExhausted, 2, base, None), Duration::ZERO);
        assert_eq!(backoff_delay(FailureKind::InvalidRequest, 1, base, None), Duration::ZERO);
    }

    #[test]
    fn system_messages_are_lifted() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("again"),
        ];
        let wire = build_request("m", &messages, &RequestOptions::default());
        assert_eq!(wire.system.as_deref(), Some("be brief"));
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[0].role, "user");

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["model"], "m");
    }

    #[test]
    fn no_system_field_without_system_messages() {
        let messages = vec![Message::user("hi")];
        let wire = build_request("m", &messages, &RequestOptions::probe());
        let json = serde_json::to_value(wire).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["max_tokens"], 1);
    }

    #[test]
    fn error_message_prefers_structured_detail() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_message(529, body), "HTTP 529: Overloaded");
        assert_eq!(error_message(502, ""), "HTTP 502: empty response body");
    }
}
