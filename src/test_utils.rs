//! Test utilities for llm-router.
//!
//! Provides a controllable clock, temporary state directories, config
//! factories and assertion macros for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use llm_router::test_utils::*;
//!
//! let clock = ManualClock::at_window_start(5);
//! let dir = TestDir::new();
//! let config = make_test_config(dir.path(), Some(&sub_url), None);
//! ```

#![allow(clippy::missing_panics_doc)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::storage::{CliOverrides, Config, ResolvedConfig};
use crate::util::Clock;

// =============================================================================
// Manual Clock
// =============================================================================

/// 2026-01-01T00:00:00Z, used as the base for deterministic clocks.
const BASE_UNIX_SECS: i64 = 1_767_225_600;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(at),
        }
    }

    /// A clock positioned exactly at the start of a quota window of
    /// `window_hours`, so a full window remains before rollover.
    #[must_use]
    pub fn at_window_start(window_hours: i64) -> Self {
        let secs = window_hours * 3600;
        let aligned = BASE_UNIX_SECS.div_euclid(secs) * secs;
        Self::new(Utc.timestamp_opt(aligned, 0).unwrap())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Config Factories
// =============================================================================

/// Config file tuned for tests: 1 ms retry backoff, 10 units per 5 h window.
#[must_use]
pub fn make_test_file_config(subscription_url: Option<&str>, metered_url: Option<&str>) -> Config {
    let mut config = Config::default();
    config.general.timeout_seconds = 5;
    config.subscription.quota_window_hours = 5;
    config.subscription.quota_per_window = 10;
    config.fallback.retry_base_delay_ms = 1;

    if let Some(url) = subscription_url {
        config.subscription.base_url = url.to_string();
        config.subscription.token = Some("sub-test-token".to_string());
    }
    if let Some(url) = metered_url {
        config.metered.base_url = url.to_string();
        config.metered.api_key = Some("sk-metered-test".to_string());
    }
    config
}

/// Resolve a test config rooted at `state_dir`, ignoring the process environment.
#[must_use]
pub fn make_test_config(
    state_dir: &Path,
    subscription_url: Option<&str>,
    metered_url: Option<&str>,
) -> ResolvedConfig {
    resolve_test_config(state_dir, &make_test_file_config(subscription_url, metered_url))
}

/// Resolve an arbitrary config rooted at `state_dir`, ignoring the process environment.
#[must_use]
pub fn resolve_test_config(state_dir: &Path, config: &Config) -> ResolvedConfig {
    let cli = CliOverrides {
        state_dir: Some(state_dir.to_path_buf()),
        timeout_seconds: None,
    };
    ResolvedConfig::resolve_with(config, &cli, &|_| None).expect("test config must be valid")
}

/// A sample config file covering every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
timeout_seconds = 20

[subscription]
token = "oauth-from-file"
quota_window_hours = 5
quota_per_window = 40
monthly_price_usd = 20.0

[metered]
api_key = "sk-from-file"
cost_per_request_usd = 0.01

[fallback]
max_consecutive_failures = 3
fallback_delay_hours = 24
oauth_retry_interval_hours = 4
"#
    .to_string()
}

/// A successful messages-API response body.
#[must_use]
pub fn make_test_completion_json(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-test",
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 12, "output_tokens": 5}
    })
}

// =============================================================================
// Temporary Directory Helpers
// =============================================================================

/// An isolated temporary directory, deleted when dropped.
#[derive(Debug)]
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories as needed.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        assert!(
            $haystack.contains($needle),
            "Expected string to contain '{}', but it didn't.\nActual: {}",
            $needle,
            $haystack
        );
    };
}

/// Assert that two floats are within an epsilon of each other.
#[macro_export]
macro_rules! assert_float_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_float_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right): (f64, f64) = ($left, $right);
        assert!(
            (left - right).abs() < $epsilon,
            "Expected {left} ≈ {right} (epsilon {})",
            $epsilon
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::at_window_start(5);
        let start = clock.now();
        assert_eq!(start.timestamp() % (5 * 3600), 0);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now() - start, Duration::hours(2));
    }

    #[test]
    fn test_config_is_isolated() {
        let dir = TestDir::new();
        let config = make_test_config(dir.path(), Some("http://127.0.0.1:1"), None);
        assert_eq!(config.state_dir, dir.path());
        assert!(config.subscription_token.is_some());
        assert!(config.metered_api_key.is_none());
        assert_eq!(config.quota_per_window, 10);
    }

    #[test]
    fn sample_toml_parses() {
        let dir = TestDir::new();
        dir.create_file("config.toml", &make_test_config_toml());
        let config = Config::load_from(&dir.file_path("config.toml")).unwrap();
        assert_eq!(config.subscription.quota_per_window, 40);
        assert_contains!(dir.read_file("config.toml").unwrap(), "oauth-from-file");
    }
}
