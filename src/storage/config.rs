//! Configuration file loading and resolution.
//!
//! Loads configuration from:
//! - Linux: `~/.config/llm-router/config.toml`
//! - macOS: `~/Library/Application Support/dev.llm-router.llm-router/config.toml`
//! - Windows: `%APPDATA%/llm-router/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `LLM_ROUTER_SUBSCRIPTION_TOKEN` (or `CLAUDE_CODE_OAUTH_TOKEN`): subscription credential
//! - `LLM_ROUTER_METERED_API_KEY` (or `ANTHROPIC_API_KEY`): metered credential
//! - `LLM_ROUTER_MAX_CONSECUTIVE_FAILURES`: transient failures before fallback
//! - `LLM_ROUTER_FALLBACK_DELAY_HOURS`: failure persistence before fallback
//! - `LLM_ROUTER_OAUTH_RETRY_INTERVAL_HOURS`: spacing of recovery probes
//! - `LLM_ROUTER_QUOTA_WINDOW_HOURS`: subscription quota window length
//! - `LLM_ROUTER_QUOTA_PER_WINDOW`: subscription units per window
//! - `LLM_ROUTER_TIMEOUT`: per-attempt timeout in seconds
//! - `LLM_ROUTER_STATE_DIR`: directory for persisted state
//! - `LLM_ROUTER_CONFIG`: override config file path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::models::Provider;
use crate::error::{Result, RouterError};
use crate::util::mask_secret;

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const ENV_MAX_CONSECUTIVE_FAILURES: &str = "LLM_ROUTER_MAX_CONSECUTIVE_FAILURES";
pub const ENV_FALLBACK_DELAY_HOURS: &str = "LLM_ROUTER_FALLBACK_DELAY_HOURS";
pub const ENV_OAUTH_RETRY_INTERVAL_HOURS: &str = "LLM_ROUTER_OAUTH_RETRY_INTERVAL_HOURS";
pub const ENV_QUOTA_WINDOW_HOURS: &str = "LLM_ROUTER_QUOTA_WINDOW_HOURS";
pub const ENV_QUOTA_PER_WINDOW: &str = "LLM_ROUTER_QUOTA_PER_WINDOW";
pub const ENV_TIMEOUT: &str = "LLM_ROUTER_TIMEOUT";
pub const ENV_STATE_DIR: &str = "LLM_ROUTER_STATE_DIR";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "LLM_ROUTER_CONFIG";

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Lookup function for environment variables; injectable for tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    crate::util::env::non_empty_var(name)
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Values supplied on the command line that take precedence over everything else.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub state_dir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
}

/// Fully resolved router configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Subscription credential (OAuth bearer token). `None` = unconfigured.
    pub subscription_token: Option<String>,
    /// Metered credential (API key). `None` = unconfigured.
    pub metered_api_key: Option<String>,
    pub subscription_base_url: String,
    pub metered_base_url: String,
    pub subscription_model: String,
    pub metered_model: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Transient Subscription failures tolerated before fallback.
    pub max_consecutive_failures: u32,
    /// How long Subscription failures may persist before fallback.
    pub fallback_delay: chrono::Duration,
    /// Minimum spacing between recovery probes while in fallback.
    pub oauth_retry_interval: chrono::Duration,
    /// Length of one subscription quota window.
    pub quota_window: chrono::Duration,
    /// Subscription units available per window.
    pub quota_per_window: u64,
    /// Fixed monthly subscription price in USD.
    pub subscription_monthly_price_usd: f64,
    /// Metered price per request in USD.
    pub metered_cost_per_request_usd: f64,
    /// First backoff delay of a backend client's retry loop.
    pub retry_base_delay: Duration,
    /// Directory holding the durable state files.
    pub state_dir: PathBuf,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub subscription_token: ConfigSource,
    pub metered_api_key: ConfigSource,
    pub timeout: ConfigSource,
    pub state_dir: ConfigSource,
    pub max_consecutive_failures: ConfigSource,
    pub fallback_delay: ConfigSource,
    pub oauth_retry_interval: ConfigSource,
    pub quota_window: ConfigSource,
    pub quota_per_window: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI overrides, the process environment,
    /// and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or any
    /// resolved value is out of range.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let config = Self::load_config(&process_env)?;
        Self::resolve_with(&config, cli, &process_env)
    }

    /// Resolve from an already-loaded config and an explicit env lookup.
    pub fn resolve_with(config: &Config, cli: &CliOverrides, env: EnvLookup<'_>) -> Result<Self> {
        config.validate()?;
        let defaults = Config::default();
        let mut sources = ConfigSources::default();

        let subscription_token = Self::resolve_credential(
            Provider::Subscription,
            config.subscription.token.as_deref(),
            env,
            &mut sources.subscription_token,
        );
        let metered_api_key = Self::resolve_credential(
            Provider::Metered,
            config.metered.api_key.as_deref(),
            env,
            &mut sources.metered_api_key,
        );

        let timeout_seconds = resolve_value(
            cli.timeout_seconds,
            ENV_TIMEOUT,
            env,
            config.general.timeout_seconds,
            defaults.general.timeout_seconds,
            &mut sources.timeout,
        )?;

        let max_consecutive_failures = resolve_value(
            None,
            ENV_MAX_CONSECUTIVE_FAILURES,
            env,
            config.fallback.max_consecutive_failures,
            defaults.fallback.max_consecutive_failures,
            &mut sources.max_consecutive_failures,
        )?;
        let fallback_delay_hours = resolve_value(
            None,
            ENV_FALLBACK_DELAY_HOURS,
            env,
            config.fallback.fallback_delay_hours,
            defaults.fallback.fallback_delay_hours,
            &mut sources.fallback_delay,
        )?;
        let oauth_retry_interval_hours = resolve_value(
            None,
            ENV_OAUTH_RETRY_INTERVAL_HOURS,
            env,
            config.fallback.oauth_retry_interval_hours,
            defaults.fallback.oauth_retry_interval_hours,
            &mut sources.oauth_retry_interval,
        )?;
        let quota_window_hours = resolve_value(
            None,
            ENV_QUOTA_WINDOW_HOURS,
            env,
            config.subscription.quota_window_hours,
            defaults.subscription.quota_window_hours,
            &mut sources.quota_window,
        )?;
        let quota_per_window = resolve_value(
            None,
            ENV_QUOTA_PER_WINDOW,
            env,
            config.subscription.quota_per_window,
            defaults.subscription.quota_per_window,
            &mut sources.quota_per_window,
        )?;

        let state_dir = Self::resolve_state_dir(cli, config, env, &mut sources.state_dir);

        let resolved = Self {
            subscription_token,
            metered_api_key,
            subscription_base_url: config.subscription.base_url.clone(),
            metered_base_url: config.metered.base_url.clone(),
            subscription_model: config.subscription.model.clone(),
            metered_model: config.metered.model.clone(),
            timeout: Duration::from_secs(timeout_seconds),
            max_consecutive_failures,
            fallback_delay: chrono::Duration::hours(i64::from(fallback_delay_hours)),
            oauth_retry_interval: chrono::Duration::hours(i64::from(oauth_retry_interval_hours)),
            quota_window: chrono::Duration::hours(i64::from(quota_window_hours)),
            quota_per_window,
            subscription_monthly_price_usd: config.subscription.monthly_price_usd,
            metered_cost_per_request_usd: config.metered.cost_per_request_usd,
            retry_base_delay: Duration::from_millis(config.fallback.retry_base_delay_ms),
            state_dir,
            sources,
        };
        resolved.validate()?;
        Ok(resolved)
    }

    /// Load config file, respecting `LLM_ROUTER_CONFIG` override.
    fn load_config(env: EnvLookup<'_>) -> Result<Config> {
        env(ENV_CONFIG).map_or_else(Config::load, |path| Config::load_from(Path::new(&path)))
    }

    fn resolve_credential(
        provider: Provider,
        from_file: Option<&str>,
        env: EnvLookup<'_>,
        source: &mut ConfigSource,
    ) -> Option<String> {
        if let Some(value) =
            env(provider.credential_env()).or_else(|| env(provider.fallback_credential_env()))
        {
            *source = ConfigSource::Env;
            return Some(value);
        }

        if let Some(value) = from_file.map(str::trim).filter(|v| !v.is_empty()) {
            *source = ConfigSource::ConfigFile;
            return Some(value.to_string());
        }

        *source = ConfigSource::Default;
        None
    }

    fn resolve_state_dir(
        cli: &CliOverrides,
        config: &Config,
        env: EnvLookup<'_>,
        source: &mut ConfigSource,
    ) -> PathBuf {
        if let Some(dir) = &cli.state_dir {
            *source = ConfigSource::Cli;
            return dir.clone();
        }
        if let Some(dir) = env(ENV_STATE_DIR) {
            *source = ConfigSource::Env;
            return PathBuf::from(dir);
        }
        if let Some(dir) = &config.general.state_dir {
            *source = ConfigSource::ConfigFile;
            return PathBuf::from(dir);
        }
        *source = ConfigSource::Default;
        AppPaths::new().data
    }

    /// Whether a backend has a credential.
    #[must_use]
    pub const fn is_configured(&self, provider: Provider) -> bool {
        match provider {
            Provider::Subscription => self.subscription_token.is_some(),
            Provider::Metered => self.metered_api_key.is_some(),
        }
    }

    /// Paths of the durable state records.
    #[must_use]
    pub fn paths(&self) -> AppPaths {
        AppPaths::with_state_dir(&self.state_dir)
    }

    /// Credential for a backend, masked for display.
    #[must_use]
    pub fn masked_credential(&self, provider: Provider) -> Option<String> {
        let raw = match provider {
            Provider::Subscription => self.subscription_token.as_deref(),
            Provider::Metered => self.metered_api_key.as_deref(),
        };
        raw.map(mask_secret)
    }

    fn validate(&self) -> Result<()> {
        let secs = self.timeout.as_secs();
        if secs == 0 || secs > 300 {
            return Err(invalid(
                "general.timeout_seconds",
                secs,
                "must be between 1 and 300 seconds",
            ));
        }
        let window_hours = self.quota_window.num_hours();
        if !(1..=24).contains(&window_hours) {
            return Err(invalid(
                "subscription.quota_window_hours",
                window_hours,
                "must be between 1 and 24 hours",
            ));
        }
        if self.quota_per_window == 0 {
            return Err(invalid(
                "subscription.quota_per_window",
                0,
                "must be greater than zero",
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(invalid(
                "fallback.max_consecutive_failures",
                0,
                "must be at least 1",
            ));
        }
        if self.oauth_retry_interval <= chrono::Duration::zero() {
            return Err(invalid(
                "fallback.oauth_retry_interval_hours",
                self.oauth_retry_interval.num_hours(),
                "must be at least 1 hour",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString, message: &str) -> RouterError {
    RouterError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

/// Resolve one tunable: CLI flag, then environment, then file, then default.
fn resolve_value<T>(
    cli: Option<T>,
    env_key: &str,
    env: EnvLookup<'_>,
    from_file: T,
    default: T,
    source: &mut ConfigSource,
) -> Result<T>
where
    T: std::str::FromStr + PartialEq,
{
    if let Some(value) = cli {
        *source = ConfigSource::Cli;
        return Ok(value);
    }

    if let Some(raw) = env(env_key) {
        *source = ConfigSource::Env;
        return raw
            .trim()
            .parse()
            .map_err(|_| invalid(env_key, &raw, "not a valid number"));
    }

    *source = if from_file == default {
        ConfigSource::Default
    } else {
        ConfigSource::ConfigFile
    };
    Ok(from_file)
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub subscription: SubscriptionConfig,
    pub metered: MeteredConfig,
    pub fallback: FallbackConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Per-attempt timeout for backend requests in seconds.
    pub timeout_seconds: u64,
    /// Directory for persisted state (defaults to the platform data dir).
    pub state_dir: Option<String>,
}

/// Subscription backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// OAuth bearer token.
    pub token: Option<String>,
    pub base_url: String,
    pub model: String,
    pub quota_window_hours: u32,
    pub quota_per_window: u64,
    pub monthly_price_usd: f64,
}

/// Metered backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteredConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub cost_per_request_usd: f64,
}

/// Fallback and recovery policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub max_consecutive_failures: u32,
    pub fallback_delay_hours: u32,
    pub oauth_retry_interval_hours: u32,
    /// First retry delay inside a backend client, in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: crate::core::http::DEFAULT_TIMEOUT.as_secs(),
            state_dir: None,
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            quota_window_hours: 5,
            quota_per_window: 45,
            monthly_price_usd: 20.0,
        }
    }
}

impl Default for MeteredConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            cost_per_request_usd: 0.015,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            fallback_delay_hours: 24,
            oauth_retry_interval_hours: 4,
            retry_base_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RouterError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RouterError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate file-level values that cannot be overridden elsewhere.
    pub fn validate(&self) -> Result<()> {
        for (key, url) in [
            ("subscription.base_url", &self.subscription.base_url),
            ("metered.base_url", &self.metered.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(key, url, "must be an http(s) URL"));
            }
        }
        if self.subscription.monthly_price_usd < 0.0 {
            return Err(invalid(
                "subscription.monthly_price_usd",
                self.subscription.monthly_price_usd,
                "must not be negative",
            ));
        }
        if self.metered.cost_per_request_usd < 0.0 {
            return Err(invalid(
                "metered.cost_per_request_usd",
                self.metered.cost_per_request_usd,
                "must not be negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn resolve(config: &Config, pairs: &[(&str, &str)]) -> Result<ResolvedConfig> {
        let env = env_from(pairs);
        let cli = CliOverrides {
            state_dir: Some(PathBuf::from("/tmp/llm-router-test")),
            ..Default::default()
        };
        ResolvedConfig::resolve_with(config, &cli, &env)
    }

    #[test]
    fn defaults_match_documented_policy() {
        let resolved = resolve(&Config::default(), &[]).unwrap();
        assert_eq!(resolved.max_consecutive_failures, 3);
        assert_eq!(resolved.fallback_delay, chrono::Duration::hours(24));
        assert_eq!(resolved.oauth_retry_interval, chrono::Duration::hours(4));
        assert_eq!(resolved.timeout, Duration::from_secs(30));
        assert!(!resolved.is_configured(Provider::Subscription));
        assert!(!resolved.is_configured(Provider::Metered));
        assert_eq!(resolved.sources.timeout, ConfigSource::Default);
    }

    #[test]
    fn env_overrides_file() {
        let mut config = Config::default();
        config.fallback.max_consecutive_failures = 5;
        config.subscription.token = Some("file-token".into());

        let resolved = resolve(
            &config,
            &[
                (ENV_MAX_CONSECUTIVE_FAILURES, "2"),
                ("LLM_ROUTER_SUBSCRIPTION_TOKEN", "env-token"),
            ],
        )
        .unwrap();
        assert_eq!(resolved.max_consecutive_failures, 2);
        assert_eq!(resolved.sources.max_consecutive_failures, ConfigSource::Env);
        assert_eq!(resolved.subscription_token.as_deref(), Some("env-token"));
    }

    #[test]
    fn file_value_is_tracked() {
        let mut config = Config::default();
        config.fallback.oauth_retry_interval_hours = 6;
        let resolved = resolve(&config, &[]).unwrap();
        assert_eq!(resolved.oauth_retry_interval, chrono::Duration::hours(6));
        assert_eq!(
            resolved.sources.oauth_retry_interval,
            ConfigSource::ConfigFile
        );
    }

    #[test]
    fn fallback_credential_env_is_used() {
        let resolved = resolve(&Config::default(), &[("ANTHROPIC_API_KEY", "sk-test")]).unwrap();
        assert_eq!(resolved.metered_api_key.as_deref(), Some("sk-test"));
        assert_eq!(resolved.sources.metered_api_key, ConfigSource::Env);
    }

    #[test]
    fn blank_file_credential_is_unconfigured() {
        let mut config = Config::default();
        config.metered.api_key = Some("   ".into());
        let resolved = resolve(&config, &[]).unwrap();
        assert!(!resolved.is_configured(Provider::Metered));
    }

    #[test]
    fn invalid_env_number_is_rejected() {
        let err = resolve(&Config::default(), &[(ENV_QUOTA_PER_WINDOW, "lots")]).unwrap_err();
        assert!(matches!(err, RouterError::ConfigInvalid { .. }));
    }

    #[test]
    fn zero_quota_is_rejected() {
        let mut config = Config::default();
        config.subscription.quota_per_window = 0;
        assert!(resolve(&config, &[]).is_err());
    }

    #[test]
    fn cli_timeout_wins() {
        let env = env_from(&[(ENV_TIMEOUT, "10")]);
        let cli = CliOverrides {
            state_dir: Some(PathBuf::from("/tmp/x")),
            timeout_seconds: Some(60),
        };
        let resolved = ResolvedConfig::resolve_with(&Config::default(), &cli, &env).unwrap();
        assert_eq!(resolved.timeout, Duration::from_secs(60));
        assert_eq!(resolved.sources.timeout, ConfigSource::Cli);
        assert_eq!(resolved.sources.state_dir, ConfigSource::Cli);
    }

    #[test]
    fn load_valid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[subscription]
token = "oauth-abc"
quota_per_window = 10

[fallback]
fallback_delay_hours = 12
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.subscription.token.as_deref(), Some("oauth-abc"));
        assert_eq!(config.subscription.quota_per_window, 10);
        assert_eq!(config.fallback.fallback_delay_hours, 12);
        assert_eq!(config.fallback.max_consecutive_failures, 3);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[subscription\nbroken").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, RouterError::ConfigParse { .. }));
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.general.timeout_seconds, 30);
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.metered.cost_per_request_usd = 0.02;
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert!((loaded.metered.cost_per_request_usd - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn non_http_base_url_is_invalid() {
        let mut config = Config::default();
        config.metered.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }
}
