//! Failure classification for backend responses.
//!
//! Maps a raw transport/HTTP outcome to a [`FailureKind`]. Rules are applied
//! in priority order and the first match wins:
//!
//! 1. Explicit quota/balance exhaustion signal → `QuotaExhausted`
//! 2. HTTP 429 or a rate-limit signal → `RateLimited`
//! 3. HTTP 401/403 or an invalid-auth signal → `Unauthorized`
//! 4. Any other 4xx → `InvalidRequest`
//! 5. HTTP 5xx, or any other non-2xx status → `ServerError`
//! 6. Transport timeout/connection failure → `NetworkError`
//! 7. Anything else → `Success`
//!
//! Body signals are only inspected on non-2xx responses so generated text
//! can never be mistaken for an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phrases that mean the account cannot be served until topped up or reset.
const QUOTA_PATTERNS: &[&str] = &[
    "insufficient balance",
    "insufficient credits",
    "insufficient_quota",
    "credit balance is too low",
    "quota exceeded",
    "quota exhausted",
    "usage limit for your plan",
    "subscription usage limit",
];

const RATE_LIMIT_PATTERNS: &[&str] = &["rate_limit_error", "rate limit", "too many requests"];

const AUTH_PATTERNS: &[&str] = &[
    "authentication_error",
    "invalid x-api-key",
    "invalid api key",
    "invalid bearer token",
    "oauth token has expired",
    "permission_error",
];

/// Classified outcome of one backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Quota or prepaid balance exhausted. Never retried automatically.
    QuotaExhausted,
    /// Throttled; retry with backoff.
    RateLimited,
    /// Credential rejected. Never retried with the same credential.
    Unauthorized,
    /// The backend refused this particular request (bad payload, unknown
    /// model, prompt too long). Returned to the caller as is.
    InvalidRequest,
    /// Upstream 5xx; retry with backoff.
    ServerError,
    /// Timeout or connection failure; retry with backoff.
    NetworkError,
    Success,
}

impl FailureKind {
    /// Whether a backend client may retry this kind locally.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::NetworkError
        )
    }

    /// Whether this kind must be escalated to the orchestrator immediately.
    #[must_use]
    pub const fn is_terminal_for_backend(self) -> bool {
        matches!(self, Self::QuotaExhausted | Self::Unauthorized)
    }

    /// Whether the failure belongs to the request rather than the backend.
    ///
    /// Such failures say nothing about backend health and are never replayed
    /// against another backend.
    #[must_use]
    pub const fn is_caller_error(self) -> bool {
        matches!(self, Self::InvalidRequest)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuotaExhausted => "quota exhausted",
            Self::RateLimited => "rate limited",
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest => "invalid request",
            Self::ServerError => "server error",
            Self::NetworkError => "network error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure before any HTTP status was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect,
    Other,
}

/// Raw outcome of a single attempt, as seen by the classifier.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// An HTTP response arrived.
    Http { status: u16, body: &'a str },
    /// No response arrived.
    Transport(TransportFailure),
}

impl Outcome<'_> {
    /// Build an outcome from a reqwest error raised before a response arrived.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Outcome<'static> {
        let failure = if err.is_timeout() {
            TransportFailure::Timeout
        } else if err.is_connect() {
            TransportFailure::Connect
        } else {
            TransportFailure::Other
        };
        Outcome::Transport(failure)
    }
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// Classify one attempt outcome. Pure; no side effects.
#[must_use]
pub fn classify(outcome: Outcome<'_>) -> FailureKind {
    let (status, body) = match outcome {
        Outcome::Transport(_) => return FailureKind::NetworkError,
        Outcome::Http { status, body } => (status, body),
    };

    if (200..300).contains(&status) {
        return FailureKind::Success;
    }

    let lower = body.to_lowercase();

    if contains_any(&lower, QUOTA_PATTERNS) {
        return FailureKind::QuotaExhausted;
    }
    if status == 429 || contains_any(&lower, RATE_LIMIT_PATTERNS) {
        return FailureKind::RateLimited;
    }
    if status == 401 || status == 403 || contains_any(&lower, AUTH_PATTERNS) {
        return FailureKind::Unauthorized;
    }
    if (400..500).contains(&status) {
        return FailureKind::InvalidRequest;
    }
    FailureKind::ServerError
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> FailureKind {
        classify(Outcome::Http { status, body })
    }

    fn error_body(kind: &str, message: &str) -> String {
        serde_json::json!({"type": "error", "error": {"type": kind, "message": message}})
            .to_string()
    }

    #[test]
    fn quota_signal_wins_over_status() {
        let body = error_body("invalid_request_error", "Your credit balance is too low");
        assert_eq!(http(400, &body), FailureKind::QuotaExhausted);
        assert_eq!(http(429, "usage limit for your plan reached"), FailureKind::QuotaExhausted);
        assert_eq!(http(402, "Insufficient Balance"), FailureKind::QuotaExhausted);
    }

    #[test]
    fn plain_429_is_rate_limited() {
        assert_eq!(http(429, ""), FailureKind::RateLimited);
        assert_eq!(
            http(400, r#"{"error":{"type":"rate_limit_error"}}"#),
            FailureKind::RateLimited
        );
    }

    #[test]
    fn auth_statuses_are_unauthorized() {
        assert_eq!(http(401, ""), FailureKind::Unauthorized);
        assert_eq!(http(403, "forbidden"), FailureKind::Unauthorized);
        assert_eq!(
            http(400, r#"{"error":{"type":"authentication_error"}}"#),
            FailureKind::Unauthorized
        );
    }

    #[test]
    fn five_hundreds_are_server_errors() {
        for status in [500, 502, 503, 504, 529] {
            assert_eq!(http(status, "overloaded"), FailureKind::ServerError);
        }
    }

    #[test]
    fn other_client_errors_are_invalid_requests() {
        let too_long = error_body(
            "invalid_request_error",
            "prompt is too long: 210000 tokens > 200000 maximum",
        );
        assert_eq!(http(400, &too_long), FailureKind::InvalidRequest);
        assert_eq!(http(404, "model not found"), FailureKind::InvalidRequest);
        assert_eq!(http(422, ""), FailureKind::InvalidRequest);
        assert!(!FailureKind::InvalidRequest.is_retryable());
        assert!(!FailureKind::InvalidRequest.is_terminal_for_backend());
        assert!(FailureKind::InvalidRequest.is_caller_error());
    }

    #[test]
    fn unexpected_statuses_are_server_errors() {
        assert_eq!(http(302, "moved"), FailureKind::ServerError);
        assert_eq!(http(600, ""), FailureKind::ServerError);
    }

    #[test]
    fn transport_failures_are_network_errors() {
        for failure in [
            TransportFailure::Timeout,
            TransportFailure::Connect,
            TransportFailure::Other,
        ] {
            assert_eq!(classify(Outcome::Transport(failure)), FailureKind::NetworkError);
        }
    }

    #[test]
    fn success_body_is_never_inspected() {
        assert_eq!(
            http(200, "the user has insufficient credits in this story"),
            FailureKind::Success
        );
    }

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::ServerError.is_retryable());
        assert!(FailureKind::NetworkError.is_retryable());
        assert!(!FailureKind::QuotaExhausted.is_retryable());
        assert!(!FailureKind::Unauthorized.is_retryable());
        assert!(FailureKind::Unauthorized.is_terminal_for_backend());
    }
}
