//! Human-readable terminal output.

use colored::{Color, Colorize};

use crate::core::models::{ActiveProvider, Completion, Provider};
use crate::core::{CostComparison, RouterStatus};
use crate::storage::{ConfigSource, ResolvedConfig};
use crate::util::{
    format_cost, format_countdown, format_percent, format_relative_time, format_tokens,
};

const LABEL_WIDTH: usize = 24;

fn paint(text: &str, color: Color, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.color(color).to_string()
    }
}

fn heading(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.bold().to_string()
    }
}

fn row(label: &str, value: &str) -> String {
    format!("  {:<LABEL_WIDTH$}{value}\n", format!("{label}:"))
}

fn active_color(active: ActiveProvider) -> Color {
    match active {
        ActiveProvider::Subscription => Color::Green,
        ActiveProvider::Metered => Color::Yellow,
        ActiveProvider::None => Color::Red,
    }
}

fn usage_color(percent: f64) -> Color {
    if percent >= 90.0 {
        Color::Red
    } else if percent >= 75.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn backend_line(configured: bool, rejected: bool, no_color: bool) -> String {
    match (configured, rejected) {
        (false, _) => paint("not configured", Color::BrightBlack, no_color),
        (true, true) => paint("credential rejected", Color::Red, no_color),
        (true, false) => paint("configured", Color::Green, no_color),
    }
}

/// Render the full router status.
#[must_use]
pub fn render_status(status: &RouterStatus, no_color: bool) -> String {
    let now = status.generated_at;
    let mut out = String::new();

    out.push_str(&heading("Routing", no_color));
    out.push('\n');
    out.push_str(&row(
        "Active backend",
        &paint(
            &status.active_provider.to_string(),
            active_color(status.active_provider),
            no_color,
        ),
    ));

    let fallback = if status.fallback_active {
        let since = status
            .fallback_started_at
            .map(|t| format!(" since {}", format_relative_time(now, t)))
            .unwrap_or_default();
        let reason = status
            .fallback_reason
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        paint(&format!("active{since}{reason}"), Color::Yellow, no_color)
    } else {
        "inactive".to_string()
    };
    out.push_str(&row("Fallback", &fallback));

    if let Some(next) = status.next_recovery_probe_at {
        out.push_str(&row("Next recovery probe", &format_countdown(now, next)));
    }
    for provider in Provider::ALL {
        let (configured, label) = match provider {
            Provider::Subscription => (status.subscription_configured, "Subscription"),
            Provider::Metered => (status.metered_configured, "Metered"),
        };
        let rejected = status.rejected_credentials.contains(provider);
        out.push_str(&row(label, &backend_line(configured, rejected, no_color)));
    }
    if status.consecutive_subscription_failures > 0 {
        out.push_str(&row(
            "Subscription failures",
            &format!("{} consecutive", status.consecutive_subscription_failures),
        ));
    }

    let quota = &status.quota;
    out.push('\n');
    out.push_str(&heading("Quota window", no_color));
    out.push('\n');
    out.push_str(&row(
        "Usage",
        &format!(
            "{} ({}/{} units)",
            paint(
                &format_percent(status.quota_usage_percent),
                usage_color(status.quota_usage_percent),
                no_color
            ),
            quota.window.units_consumed,
            quota.units_per_window
        ),
    ));
    out.push_str(&row(
        "Requests",
        &format!(
            "{} ({} success, avg {:.0} ms)",
            quota.window.requests_in_window,
            format_percent(quota.window.success_rate),
            quota.window.average_latency_ms
        ),
    ));
    out.push_str(&row("Resets", &format_countdown(now, quota.resets_at)));

    let usage = &status.usage_stats;
    out.push('\n');
    out.push_str(&heading("Usage", no_color));
    out.push('\n');
    out.push_str(&row(
        "Subscription requests",
        &usage.subscription_requests.to_string(),
    ));
    out.push_str(&row("Metered requests", &usage.metered_requests.to_string()));
    out.push_str(&row(
        "Fallback activations",
        &usage.fallback_activations.to_string(),
    ));
    let thresholds = if status.thresholds_notified.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = status
            .thresholds_notified
            .iter()
            .map(|t| format!("{t}%"))
            .collect();
        format!(" (crossed {})", list.join(", "))
    };
    out.push_str(&row(
        "Budget alerts",
        &format!("{}{thresholds}", status.alerts_fired),
    ));

    out.push('\n');
    out.push_str(&render_comparison(&status.cost, no_color));
    out
}

/// Render a completion: the generated text followed by a short footer.
#[must_use]
pub fn render_completion(completion: &Completion, no_color: bool) -> String {
    let footer = format!(
        "[{} · {} · {} in / {} out tokens]",
        completion.provider,
        completion.model,
        format_tokens(completion.usage.input_tokens),
        format_tokens(completion.usage.output_tokens)
    );
    format!(
        "{}\n\n{}\n",
        completion.content.trim_end(),
        paint(&footer, Color::BrightBlack, no_color)
    )
}

/// Render the subscription vs. metered comparison.
#[must_use]
pub fn render_comparison(comparison: &CostComparison, no_color: bool) -> String {
    let mut out = String::new();
    out.push_str(&heading("Monthly cost", no_color));
    out.push('\n');
    out.push_str(&row(
        "Observed rate",
        &format!(
            "{:.1} requests/day over {:.1} days",
            comparison.extrapolated_daily_requests, comparison.days_observed
        ),
    ));
    out.push_str(&row(
        "Subscription",
        &format_cost(comparison.subscription_monthly_usd),
    ));
    out.push_str(&row(
        "Metered equivalent",
        &format_cost(comparison.metered_monthly_usd),
    ));
    let savings = comparison.difference_usd.abs();
    out.push_str(&row(
        "Cheaper",
        &format!(
            "{} (saves {}/month)",
            paint(comparison.cheaper.cli_name(), Color::Green, no_color),
            format_cost(savings)
        ),
    ));
    out
}

fn source_note(source: ConfigSource) -> String {
    format!("  [{source}]")
}

/// Render resolved configuration with value sources. Credentials are masked.
#[must_use]
pub fn render_config(config: &ResolvedConfig, no_color: bool) -> String {
    let sources = &config.sources;
    let credential = |provider: Provider| {
        config
            .masked_credential(provider)
            .unwrap_or_else(|| paint("(not set)", Color::BrightBlack, no_color))
    };

    let mut out = String::new();
    out.push_str(&heading("Backends", no_color));
    out.push('\n');
    out.push_str(&row(
        "Subscription token",
        &format!(
            "{}{}",
            credential(Provider::Subscription),
            source_note(sources.subscription_token)
        ),
    ));
    out.push_str(&row("Subscription URL", &config.subscription_base_url));
    out.push_str(&row("Subscription model", &config.subscription_model));
    out.push_str(&row(
        "Metered API key",
        &format!(
            "{}{}",
            credential(Provider::Metered),
            source_note(sources.metered_api_key)
        ),
    ));
    out.push_str(&row("Metered URL", &config.metered_base_url));
    out.push_str(&row("Metered model", &config.metered_model));

    out.push('\n');
    out.push_str(&heading("Policy", no_color));
    out.push('\n');
    out.push_str(&row(
        "Max consecutive failures",
        &format!(
            "{}{}",
            config.max_consecutive_failures,
            source_note(sources.max_consecutive_failures)
        ),
    ));
    out.push_str(&row(
        "Fallback delay",
        &format!(
            "{}h{}",
            config.fallback_delay.num_hours(),
            source_note(sources.fallback_delay)
        ),
    ));
    out.push_str(&row(
        "Recovery interval",
        &format!(
            "{}h{}",
            config.oauth_retry_interval.num_hours(),
            source_note(sources.oauth_retry_interval)
        ),
    ));
    out.push_str(&row(
        "Quota window",
        &format!(
            "{}h{}",
            config.quota_window.num_hours(),
            source_note(sources.quota_window)
        ),
    ));
    out.push_str(&row(
        "Quota per window",
        &format!(
            "{}{}",
            config.quota_per_window,
            source_note(sources.quota_per_window)
        ),
    ));
    out.push_str(&row(
        "Timeout",
        &format!("{}s{}", config.timeout.as_secs(), source_note(sources.timeout)),
    ));
    out.push_str(&row(
        "State directory",
        &format!(
            "{}{}",
            config.state_dir.display(),
            source_note(sources.state_dir)
        ),
    ));
    out
}
