//! Error types for llm-router.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into six main categories:
//! - **Authentication**: Credentials rejected or missing for a backend
//! - **Quota**: Subscription window or metered balance exhausted
//! - **Request**: The backend refused the request itself (bad payload)
//! - **Transient**: Rate limits, upstream 5xx, network failures (retryable)
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Internal**: State file corruption, I/O, serialization, unclassified
//!
//! Transient errors are absorbed inside a backend client's retry loop and
//! only surface to the caller inside [`RouterError::AllProvidersFailed`].
//!
//! Each error has a stable error code (e.g., `LLMR-A001`) for programmatic handling.

pub mod suggestions;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::core::classifier::FailureKind;
use crate::core::models::Provider;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credentials rejected or not configured.
    Authentication,
    /// Quota window or prepaid balance exhausted.
    Quota,
    /// The request itself was refused.
    Request,
    /// Rate limits, server errors, network failures.
    Transient,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Internal errors (state corruption, I/O, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Quota => "Quota error",
            Self::Request => "Request rejected",
            Self::Transient => "Transient backend error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Quota => "Q",
            Self::Request => "R",
            Self::Transient => "T",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// No backend configured or every backend failed
    Unavailable = 2,
    /// Config parse/validation errors
    ConfigError = 3,
    /// Quota or balance exhausted
    QuotaExhausted = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Backend failure record
// =============================================================================

/// One backend's terminal failure for a request, as listed in
/// [`RouterError::AllProvidersFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    /// Backend that failed.
    pub provider: Provider,
    /// Classified failure of the last attempt.
    pub kind: FailureKind,
    /// Attempts made against this backend for the request.
    pub attempts: u32,
    /// HTTP status of the last attempt, if any response arrived.
    pub status_code: Option<u16>,
    /// Short description of the last failure.
    pub message: String,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} after {} attempt{}",
            self.provider.cli_name(),
            self.kind,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" }
        )?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        Ok(())
    }
}

fn join_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for llm-router operations.
#[derive(Error, Debug)]
pub enum RouterError {
    // ==========================================================================
    // Authentication errors (Category: Authentication)
    // ==========================================================================
    /// Backend rejected the configured credential (HTTP 401/403).
    #[error("{provider} rejected credentials: {reason}")]
    Unauthorized { provider: Provider, reason: String },

    /// No configured backend can currently accept requests.
    #[error("no backend available: configure a subscription token or a metered API key")]
    NoProviderAvailable,

    // ==========================================================================
    // Quota errors (Category: Quota)
    // ==========================================================================
    /// Quota or prepaid balance exhausted for a backend.
    #[error("{provider} quota exhausted: {message}")]
    QuotaExhausted { provider: Provider, message: String },

    // ==========================================================================
    // Request errors (Category: Request)
    // ==========================================================================
    /// Backend refused the request itself (HTTP 4xx other than auth, quota
    /// and rate limits).
    #[error("{provider} rejected the request (HTTP {status_code}): {message}")]
    InvalidRequest {
        provider: Provider,
        status_code: u16,
        message: String,
    },

    // ==========================================================================
    // Transient errors (Category: Transient)
    // ==========================================================================
    /// Rate limited by a backend.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: Provider,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Backend answered with a 5xx status.
    #[error("{provider} server error (HTTP {status_code}): {message}")]
    ServerError {
        provider: Provider,
        status_code: u16,
        message: String,
    },

    /// Connection failure or per-attempt timeout.
    #[error("network error talking to {provider}: {message}")]
    Network { provider: Provider, message: String },

    // ==========================================================================
    // Aggregated (Category: by first failure)
    // ==========================================================================
    /// Every configured backend failed for this request.
    #[error("all backends failed: {}", join_failures(.failures))]
    AllProvidersFailed { failures: Vec<BackendFailure> },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// A persisted state file could not be parsed.
    #[error("state file {path} is corrupt: {message}")]
    StateCorrupt { path: String, message: String },

    /// Upstream answered 2xx but the body was not a valid completion.
    #[error("failed to parse {provider} response: {message}")]
    ParseResponse { provider: Provider, message: String },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RouterError {
    /// Build the terminal error matching one backend failure.
    #[must_use]
    pub fn from_failure(failure: &BackendFailure) -> Self {
        let provider = failure.provider;
        let message = failure.message.clone();
        match failure.kind {
            FailureKind::QuotaExhausted => Self::QuotaExhausted { provider, message },
            FailureKind::Unauthorized => Self::Unauthorized {
                provider,
                reason: message,
            },
            FailureKind::RateLimited => Self::RateLimited {
                provider,
                retry_after: None,
                message,
            },
            FailureKind::InvalidRequest => Self::InvalidRequest {
                provider,
                status_code: failure.status_code.unwrap_or(400),
                message,
            },
            FailureKind::ServerError => Self::ServerError {
                provider,
                status_code: failure.status_code.unwrap_or(500),
                message,
            },
            FailureKind::NetworkError | FailureKind::Success => Self::Network { provider, message },
        }
    }

    /// Map error to a process exit code.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::Config(_) => {
                ExitCode::ConfigError
            }
            Self::QuotaExhausted { .. } => ExitCode::QuotaExhausted,
            Self::NoProviderAvailable | Self::AllProvidersFailed { .. } => ExitCode::Unavailable,
            Self::Unauthorized { .. }
            | Self::InvalidRequest { .. }
            | Self::RateLimited { .. }
            | Self::ServerError { .. }
            | Self::Network { .. }
            | Self::StateCorrupt { .. }
            | Self::ParseResponse { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } | Self::NoProviderAvailable => ErrorCategory::Authentication,
            Self::QuotaExhausted { .. } => ErrorCategory::Quota,
            Self::InvalidRequest { .. } => ErrorCategory::Request,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network { .. } => {
                ErrorCategory::Transient
            }
            Self::AllProvidersFailed { failures } => failures
                .last()
                .map_or(ErrorCategory::Internal, |f| match f.kind {
                    FailureKind::Unauthorized => ErrorCategory::Authentication,
                    FailureKind::QuotaExhausted => ErrorCategory::Quota,
                    FailureKind::InvalidRequest => ErrorCategory::Request,
                    FailureKind::RateLimited
                    | FailureKind::ServerError
                    | FailureKind::NetworkError => ErrorCategory::Transient,
                    FailureKind::Success => ErrorCategory::Internal,
                }),
            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::Config(_) => {
                ErrorCategory::Configuration
            }
            Self::StateCorrupt { .. }
            | Self::ParseResponse { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `LLMR-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "LLMR-A001",
            Self::NoProviderAvailable => "LLMR-A002",

            Self::QuotaExhausted { .. } => "LLMR-Q001",

            Self::InvalidRequest { .. } => "LLMR-R001",

            Self::RateLimited { .. } => "LLMR-T001",
            Self::ServerError { .. } => "LLMR-T002",
            Self::Network { .. } => "LLMR-T003",
            Self::AllProvidersFailed { .. } => "LLMR-T010",

            Self::ConfigParse { .. } => "LLMR-C001",
            Self::ConfigInvalid { .. } => "LLMR-C002",
            Self::Config(_) => "LLMR-C003",

            Self::StateCorrupt { .. } => "LLMR-X001",
            Self::ParseResponse { .. } => "LLMR-X002",
            Self::Io(_) => "LLMR-X003",
            Self::Json(_) => "LLMR-X004",
            Self::Other(_) => "LLMR-X099",
        }
    }

    /// Returns whether the error is potentially recoverable by retrying later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network { .. }
        )
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the backend if this error is backend-specific.
    #[must_use]
    pub fn provider(&self) -> Option<Provider> {
        match self {
            Self::Unauthorized { provider, .. }
            | Self::QuotaExhausted { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::ServerError { provider, .. }
            | Self::Network { provider, .. }
            | Self::ParseResponse { provider, .. } => Some(*provider),
            Self::AllProvidersFailed { failures } => failures.last().map(|f| f.provider),
            _ => None,
        }
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::Unauthorized { provider, reason } => {
                suggestions::unauthorized_suggestions(*provider, reason)
            }
            Self::NoProviderAvailable => suggestions::no_provider_suggestions(),
            Self::QuotaExhausted { provider, .. } => suggestions::quota_suggestions(*provider),
            Self::InvalidRequest { .. } => suggestions::invalid_request_suggestions(),
            Self::RateLimited { retry_after, .. } => {
                suggestions::rate_limited_suggestions(*retry_after)
            }
            Self::ServerError { .. } | Self::Network { .. } => {
                suggestions::transient_suggestions()
            }
            Self::AllProvidersFailed { failures } => failures
                .iter()
                .flat_map(|f| Self::from_failure(f).fix_suggestions())
                .collect(),
            Self::ConfigParse { path, .. } => suggestions::config_parse_suggestions(path),
            Self::ConfigInvalid { key, .. } => suggestions::config_invalid_suggestions(key),
            Self::Config(msg) => vec![FixSuggestion::new(
                vec!["llm-router config show".to_string()],
                format!("Configuration error: {msg}"),
            )],
            Self::StateCorrupt { path, .. } => suggestions::state_corrupt_suggestions(path),
            Self::ParseResponse { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => Vec::new(),
        }
    }
}

/// Result type alias for llm-router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
