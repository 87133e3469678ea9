//! Storage for configuration and durable router state.

pub mod config;
pub mod paths;
pub mod state_file;

pub use config::{
    CliOverrides, Config, ConfigSource, ConfigSources, ResolvedConfig, ENV_CONFIG,
    ENV_FALLBACK_DELAY_HOURS, ENV_MAX_CONSECUTIVE_FAILURES, ENV_OAUTH_RETRY_INTERVAL_HOURS,
    ENV_QUOTA_PER_WINDOW, ENV_QUOTA_WINDOW_HOURS, ENV_STATE_DIR, ENV_TIMEOUT,
};
pub use paths::AppPaths;
