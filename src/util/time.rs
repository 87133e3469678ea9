//! Clock abstraction and time formatting utilities.

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Source of wall-clock time.
///
/// Window rollover, fallback delays and recovery intervals all read time
/// through this trait so they can be driven deterministically in tests.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a non-negative duration as a compact countdown ("2h 5m", "40s").
#[must_use]
pub fn format_duration(duration: chrono::Duration) -> String {
    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 24 {
        let days = hours / 24;
        format!("{days} day{}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{}s", duration.num_seconds())
    }
}

/// Format a countdown from `now` to a future time.
#[must_use]
pub fn format_countdown(now: DateTime<Utc>, target: DateTime<Utc>) -> String {
    let duration = target.signed_duration_since(now);
    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }
    format!("in {}", format_duration(duration))
}

/// Format a relative time (past or future).
#[must_use]
pub fn format_relative_time(now: DateTime<Utc>, target: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(target);

    if duration.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let minutes = duration.num_minutes().abs();
    let hours = duration.num_hours().abs();
    let days = duration.num_days().abs();

    let suffix = if duration.num_seconds() > 0 {
        "ago"
    } else {
        "from now"
    };

    if days > 0 {
        format!("{days} day{} {suffix}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{hours} hour{} {suffix}", if hours == 1 { "" } else { "s" })
    } else {
        format!(
            "{minutes} minute{} {suffix}",
            if minutes == 1 { "" } else { "s" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn countdown_hours() {
        let now = Utc::now();
        let target = now + Duration::hours(3) + Duration::minutes(30);
        assert_eq!(format_countdown(now, target), "in 3h 30m");
    }

    #[test]
    fn countdown_past_is_now() {
        let now = Utc::now();
        assert_eq!(format_countdown(now, now - Duration::minutes(5)), "now");
    }

    #[test]
    fn relative_time_past() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now, now - Duration::hours(2)), "2 hours ago");
    }
}
