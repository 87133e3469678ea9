//! Quota threshold alerts and subscription vs. metered cost comparison.
//!
//! Alerts fire at fixed percentages of the current quota window. Each
//! threshold fires at most once per billing period; the period is keyed by
//! the quota `window_id`, so a new window clears the notified set.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::models::Provider;

/// Usage percentages that raise an alert.
pub const ALERT_THRESHOLDS: [u8; 4] = [50, 75, 90, 95];

/// Days used to turn a daily request rate into a monthly cost.
const DAYS_PER_MONTH: f64 = 30.0;

// =============================================================================
// Alerts
// =============================================================================

/// A threshold crossed for the first time in a billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub threshold: u8,
    pub usage_percent: f64,
    pub period_id: i64,
}

impl std::fmt::Display for BudgetAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "subscription quota at {:.1}% (crossed {}%)",
            self.usage_percent, self.threshold
        )
    }
}

/// Thresholds already notified in the current billing period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetAlertState {
    pub period_id: Option<i64>,
    pub notified: BTreeSet<u8>,
}

// =============================================================================
// Cost comparison
// =============================================================================

/// Prices used for the monthly comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub subscription_monthly_usd: f64,
    pub metered_per_request_usd: f64,
}

/// Monthly economics of the two backends at the observed request rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparison {
    pub total_requests: u64,
    pub days_observed: f64,
    pub extrapolated_daily_requests: f64,
    pub subscription_monthly_usd: f64,
    pub metered_monthly_usd: f64,
    /// Backend with the lower monthly cost (Subscription on a tie).
    pub cheaper: Provider,
    /// `metered_monthly_usd - subscription_monthly_usd`; positive means the
    /// subscription saves money.
    pub difference_usd: f64,
}

// =============================================================================
// Monitor
// =============================================================================

/// Raises quota threshold alerts and compares backend costs.
#[derive(Debug)]
pub struct BudgetMonitor {
    pricing: Pricing,
    state: Mutex<BudgetAlertState>,
    alerts_fired: AtomicU64,
}

impl BudgetMonitor {
    #[must_use]
    pub fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            state: Mutex::new(BudgetAlertState::default()),
            alerts_fired: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BudgetAlertState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the thresholds newly crossed by `usage_percent` in `period_id`.
    ///
    /// A jump past several thresholds at once returns all of them in ascending order.
    pub fn check_thresholds(&self, usage_percent: f64, period_id: i64) -> Vec<BudgetAlert> {
        let mut state = self.lock();
        if state.period_id != Some(period_id) {
            state.period_id = Some(period_id);
            state.notified.clear();
        }

        let mut alerts = Vec::new();
        for threshold in ALERT_THRESHOLDS {
            if usage_percent >= f64::from(threshold) && state.notified.insert(threshold) {
                alerts.push(BudgetAlert {
                    threshold,
                    usage_percent,
                    period_id,
                });
            }
        }
        drop(state);

        self.alerts_fired.fetch_add(alerts.len() as u64, Ordering::Relaxed);
        alerts
    }

    /// Alerts raised since the process started (or the last reset).
    #[must_use]
    pub fn alerts_fired(&self) -> u64 {
        self.alerts_fired.load(Ordering::Relaxed)
    }

    /// Thresholds notified in the current period.
    #[must_use]
    pub fn notified(&self) -> Vec<u8> {
        self.lock().notified.iter().copied().collect()
    }

    /// Forget every notified threshold.
    pub fn reset(&self) {
        *self.lock() = BudgetAlertState::default();
        self.alerts_fired.store(0, Ordering::Relaxed);
    }

    /// Compare monthly costs given `total_requests` served over `observed`.
    ///
    /// The observation period is floored at one day so a fresh install does
    /// not extrapolate a handful of requests into a huge daily rate.
    #[must_use]
    pub fn compare_providers(&self, total_requests: u64, observed: Duration) -> CostComparison {
        #[allow(clippy::cast_precision_loss)]
        let days_observed = (observed.num_seconds() as f64 / 86_400.0).max(1.0);
        #[allow(clippy::cast_precision_loss)]
        let extrapolated_daily_requests = total_requests as f64 / days_observed;

        let subscription_monthly_usd = self.pricing.subscription_monthly_usd;
        let metered_monthly_usd =
            extrapolated_daily_requests * DAYS_PER_MONTH * self.pricing.metered_per_request_usd;
        let cheaper = if metered_monthly_usd < subscription_monthly_usd {
            Provider::Metered
        } else {
            Provider::Subscription
        };

        CostComparison {
            total_requests,
            days_observed,
            extrapolated_daily_requests,
            subscription_monthly_usd,
            metered_monthly_usd,
            cheaper,
            difference_usd: metered_monthly_usd - subscription_monthly_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> BudgetMonitor {
        BudgetMonitor::new(Pricing {
            subscription_monthly_usd: 20.0,
            metered_per_request_usd: 0.01,
        })
    }

    #[test]
    fn each_threshold_fires_once_per_period() {
        let monitor = monitor();
        let mut fired = Vec::new();
        let mut usage = 40.0;
        while usage <= 100.0 {
            fired.extend(monitor.check_thresholds(usage, 7).into_iter().map(|a| a.threshold));
            usage += 1.0;
        }
        assert_eq!(fired, vec![50, 75, 90, 95]);
        assert_eq!(monitor.alerts_fired(), 4);
    }

    #[test]
    fn jump_fires_every_crossed_threshold() {
        let monitor = monitor();
        let alerts = monitor.check_thresholds(92.0, 1);
        let thresholds: Vec<u8> = alerts.iter().map(|a| a.threshold).collect();
        assert_eq!(thresholds, vec![50, 75, 90]);
        assert!(monitor.check_thresholds(93.0, 1).is_empty());
    }

    #[test]
    fn new_period_clears_notified() {
        let monitor = monitor();
        assert_eq!(monitor.check_thresholds(60.0, 1).len(), 1);
        assert!(monitor.check_thresholds(60.0, 1).is_empty());
        assert_eq!(monitor.check_thresholds(60.0, 2).len(), 1);
        assert_eq!(monitor.notified(), vec![50]);
    }

    #[test]
    fn below_first_threshold_is_silent() {
        let monitor = monitor();
        assert!(monitor.check_thresholds(49.9, 1).is_empty());
        assert_eq!(monitor.alerts_fired(), 0);
    }

    #[test]
    fn metered_cheaper_at_low_volume() {
        // 10 req/day * 30 * $0.01 = $3 < $20
        let cmp = monitor().compare_providers(100, Duration::days(10));
        assert!((cmp.extrapolated_daily_requests - 10.0).abs() < 1e-9);
        assert!((cmp.metered_monthly_usd - 3.0).abs() < 1e-9);
        assert_eq!(cmp.cheaper, Provider::Metered);
        assert!((cmp.difference_usd + 17.0).abs() < 1e-9);
    }

    #[test]
    fn subscription_cheaper_at_high_volume() {
        // 200 req/day * 30 * $0.01 = $60 > $20
        let cmp = monitor().compare_providers(200, Duration::hours(3));
        assert!((cmp.days_observed - 1.0).abs() < 1e-9);
        assert_eq!(cmp.cheaper, Provider::Subscription);
        assert!((cmp.difference_usd - 40.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_state() {
        let monitor = monitor();
        monitor.check_thresholds(80.0, 3);
        monitor.reset();
        assert!(monitor.notified().is_empty());
        assert_eq!(monitor.alerts_fired(), 0);
        assert_eq!(monitor.check_thresholds(80.0, 3).len(), 2);
    }
}
