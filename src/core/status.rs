//! Router status snapshot returned by `Orchestrator::status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::budget::CostComparison;
use crate::core::classifier::FailureKind;
use crate::core::models::{ActiveProvider, Provider};
use crate::core::orchestrator::UsageCounters;
use crate::core::quota::QuotaSnapshot;

/// Everything an operator needs to see about routing at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterStatus {
    pub generated_at: DateTime<Utc>,
    pub active_provider: ActiveProvider,
    pub fallback_active: bool,
    pub fallback_reason: Option<FailureKind>,
    pub fallback_started_at: Option<DateTime<Utc>>,
    pub consecutive_subscription_failures: u32,
    pub last_subscription_failure_at: Option<DateTime<Utc>>,
    pub failure_streak_started_at: Option<DateTime<Utc>>,
    pub last_recovery_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the next recovery probe may run, while in fallback.
    pub next_recovery_probe_at: Option<DateTime<Utc>>,
    pub usage_stats: UsageCounters,
    pub quota_usage_percent: f64,
    pub time_until_reset_secs: i64,
    pub quota: QuotaSnapshot,
    pub subscription_configured: bool,
    pub metered_configured: bool,
    /// Backends whose credential was rejected in this process.
    pub rejected_credentials: Vec<Provider>,
    pub alerts_fired: u64,
    pub thresholds_notified: Vec<u8>,
    pub cost: CostComparison,
}

impl RouterStatus {
    /// Whether any backend can serve a request right now.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        !matches!(self.active_provider, ActiveProvider::None)
    }
}
