//! Robot-mode output (JSON and Markdown).
//!
//! Provides stable, token-efficient output for scripts and agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::Provider;
use crate::core::{CostComparison, RouterStatus};
use crate::error::Result;
use crate::storage::ResolvedConfig;

/// Schema identifier for JSON output.
pub const SCHEMA_VERSION: &str = "llm-router.v1";

/// Envelope wrapping every JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
}

impl<T> RobotOutput<T> {
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            command: command.into(),
            data,
        }
    }
}

/// Render any serializable value as JSON.
pub fn render_json<T: Serialize>(output: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(output)?)
    } else {
        Ok(serde_json::to_string(output)?)
    }
}

/// Wrap `data` in the envelope and render it.
pub fn render_envelope<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    render_json(&RobotOutput::new(command, data), pretty)
}

/// Serializable view of the resolved configuration. Credentials are masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub subscription_token: Option<String>,
    pub subscription_token_source: String,
    pub subscription_base_url: String,
    pub subscription_model: String,
    pub metered_api_key: Option<String>,
    pub metered_api_key_source: String,
    pub metered_base_url: String,
    pub metered_model: String,
    pub timeout_seconds: u64,
    pub max_consecutive_failures: u32,
    pub fallback_delay_hours: i64,
    pub oauth_retry_interval_hours: i64,
    pub quota_window_hours: i64,
    pub quota_per_window: u64,
    pub subscription_monthly_price_usd: f64,
    pub metered_cost_per_request_usd: f64,
    pub state_dir: String,
}

impl ConfigView {
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            subscription_token: config.masked_credential(Provider::Subscription),
            subscription_token_source: config.sources.subscription_token.to_string(),
            subscription_base_url: config.subscription_base_url.clone(),
            subscription_model: config.subscription_model.clone(),
            metered_api_key: config.masked_credential(Provider::Metered),
            metered_api_key_source: config.sources.metered_api_key.to_string(),
            metered_base_url: config.metered_base_url.clone(),
            metered_model: config.metered_model.clone(),
            timeout_seconds: config.timeout.as_secs(),
            max_consecutive_failures: config.max_consecutive_failures,
            fallback_delay_hours: config.fallback_delay.num_hours(),
            oauth_retry_interval_hours: config.oauth_retry_interval.num_hours(),
            quota_window_hours: config.quota_window.num_hours(),
            quota_per_window: config.quota_per_window,
            subscription_monthly_price_usd: config.subscription_monthly_price_usd,
            metered_cost_per_request_usd: config.metered_cost_per_request_usd,
            state_dir: config.state_dir.display().to_string(),
        }
    }
}

/// Render status as Markdown.
#[must_use]
pub fn render_status_md(status: &RouterStatus) -> String {
    let mut out = String::from("## Router status\n");
    out.push_str(&format!("- active_provider: {}\n", status.active_provider));
    out.push_str(&format!("- fallback_active: {}\n", status.fallback_active));
    if let Some(reason) = status.fallback_reason {
        out.push_str(&format!("- fallback_reason: {reason}\n"));
    }
    if let Some(next) = status.next_recovery_probe_at {
        out.push_str(&format!("- next_recovery_probe_at: {}\n", next.to_rfc3339()));
    }
    out.push_str(&format!(
        "- quota_usage: {:.1}%\n- time_until_reset: {}s\n",
        status.quota_usage_percent, status.time_until_reset_secs
    ));
    let usage = &status.usage_stats;
    out.push_str(&format!(
        "- subscription_requests: {}\n- metered_requests: {}\n- fallback_activations: {}\n",
        usage.subscription_requests, usage.metered_requests, usage.fallback_activations
    ));
    out.push('\n');
    out.push_str(&render_comparison_md(&status.cost));
    out
}

/// Render a cost comparison as Markdown.
#[must_use]
pub fn render_comparison_md(comparison: &CostComparison) -> String {
    format!(
        concat!(
            "## Monthly cost\n",
            "- daily_requests: {:.1}\n",
            "- subscription_usd: {:.2}\n",
            "- metered_usd: {:.2}\n",
            "- cheaper: {}\n",
            "- difference_usd: {:.2}\n",
        ),
        comparison.extrapolated_daily_requests,
        comparison.subscription_monthly_usd,
        comparison.metered_monthly_usd,
        comparison.cheaper,
        comparison.difference_usd
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestDir, make_test_config};

    #[test]
    fn envelope_uses_camel_case() {
        let json = render_envelope("compare", &serde_json::json!({"a": 1}), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(value["command"], "compare");
        assert_eq!(value["data"]["a"], 1);
    }

    #[test]
    fn config_view_never_leaks_credentials() {
        let dir = TestDir::new();
        let config = make_test_config(dir.path(), Some("http://a"), Some("http://b"));
        let json = render_json(&ConfigView::from_config(&config), false).unwrap();
        assert!(!json.contains("sub-test-token"));
        assert!(!json.contains("sk-metered-test"));
        assert!(json.contains("\"quotaPerWindow\":10"));
    }
}
