//! Structured logging to stderr or a log file.
//!
//! Level comes from `--log-level`, then `LLM_ROUTER_LOG`; format from
//! `--json-output`, then `LLM_ROUTER_LOG_FORMAT`. `RUST_LOG` overrides both
//! when set.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "LLM_ROUTER_LOG";
pub const LOG_FORMAT_ENV: &str = "LLM_ROUTER_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "LLM_ROUTER_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log level from CLI argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to tracing filter string.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Convert to tracing level.
    #[must_use]
    pub const fn as_tracing_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse log level from the `LLM_ROUTER_LOG` value.
#[must_use]
pub fn parse_log_level(value: Option<String>) -> Option<LogLevel> {
    non_empty(value).and_then(|v| LogLevel::from_arg(&v))
}

/// Parse log format from the `LLM_ROUTER_LOG_FORMAT` value.
#[must_use]
pub fn parse_log_format(value: Option<String>) -> Option<LogFormat> {
    non_empty(value).and_then(|v| LogFormat::from_arg(&v))
}

/// Parse log file path from the `LLM_ROUTER_LOG_FILE` value.
#[must_use]
pub fn parse_log_file(value: Option<String>) -> Option<PathBuf> {
    non_empty(value).map(PathBuf::from)
}

/// Read all three logging variables from the process environment.
#[must_use]
pub fn settings_from_env() -> (Option<LogLevel>, Option<LogFormat>, Option<PathBuf>) {
    (
        parse_log_level(std::env::var(LOG_LEVEL_ENV).ok()),
        parse_log_format(std::env::var(LOG_FORMAT_ENV).ok()),
        parse_log_file(std::env::var(LOG_FILE_ENV).ok()),
    )
}

/// Initialize logging with the given settings.
///
/// `verbose` raises the default `Warn` level to `Debug`. Calling this more than
/// once is harmless; later calls are ignored.
pub fn init(level: LogLevel, format: LogFormat, log_file: Option<PathBuf>, verbose: bool) {
    let level = if verbose && level == LogLevel::Warn {
        LogLevel::Debug
    } else {
        level
    };

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
    });

    let writer = file.map_or_else(
        || BoxMakeWriter::new(std::io::stderr),
        BoxMakeWriter::new,
    );

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("llm_router={}", level.as_filter())));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_writer(writer)
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_target(false)
                .without_time()
                .try_init()
                .ok();
        }
    }
}
