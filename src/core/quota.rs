//! Subscription quota accounting over fixed-length windows.
//!
//! Windows are aligned to the Unix epoch: `window_id = floor(unix_secs / window_secs)`.
//! The first call that observes a new `window_id` archives the finished window
//! to an append-only log and resets every window-scoped counter. All reads and
//! writes of the window happen under one mutex and the record is flushed to
//! disk before the lock is released.
//!
//! Requests in flight hold a [`QuotaReservation`] so concurrent callers cannot
//! all pass the quota check on the last unit. Reservations live in memory only.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{AppPaths, state_file};
use crate::util::Clock;

// =============================================================================
// Window record
// =============================================================================

/// Accounting for one quota window. Persisted to `quota-window.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaWindow {
    pub window_id: i64,
    pub window_started_at: DateTime<Utc>,
    /// Units charged against the quota (one per successful request).
    pub units_consumed: u64,
    /// Every attempt, successful or not.
    pub requests_in_window: u64,
    /// Success percentage over `requests_in_window`, 0..=100.
    pub success_rate: f64,
    /// Running mean latency over `requests_in_window`.
    pub average_latency_ms: f64,
}

impl Default for QuotaWindow {
    fn default() -> Self {
        Self {
            window_id: 0,
            window_started_at: DateTime::<Utc>::UNIX_EPOCH,
            units_consumed: 0,
            requests_in_window: 0,
            success_rate: 0.0,
            average_latency_ms: 0.0,
        }
    }
}

impl QuotaWindow {
    fn fresh(window_id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            window_id,
            window_started_at: started_at,
            ..Self::default()
        }
    }

    fn record(&mut self, success: bool, latency_ms: f64) {
        self.requests_in_window += 1;
        if success {
            self.units_consumed += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.requests_in_window as f64;
        let sample = if success { 100.0 } else { 0.0 };
        self.success_rate = (self.success_rate * (n - 1.0) + sample) / n;
        self.average_latency_ms += (latency_ms - self.average_latency_ms) / n;
    }
}

/// Point-in-time view of the current window for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub window: QuotaWindow,
    pub units_per_window: u64,
    pub usage_percent: f64,
    pub resets_at: DateTime<Utc>,
    pub seconds_until_reset: i64,
}

// =============================================================================
// Tracker
// =============================================================================

/// Window record plus the units promised to requests still in flight.
#[derive(Debug)]
struct Ledger {
    window: QuotaWindow,
    reserved: u64,
}

/// One quota unit held by a request in flight. Released on drop.
#[derive(Debug)]
#[must_use = "the unit is released as soon as the reservation is dropped"]
pub struct QuotaReservation<'a> {
    tracker: &'a QuotaTracker,
    window_id: i64,
}

impl Drop for QuotaReservation<'_> {
    fn drop(&mut self) {
        let mut ledger = self.tracker.lock();
        if ledger.window.window_id == self.window_id {
            ledger.reserved = ledger.reserved.saturating_sub(1);
        }
    }
}

/// Owns the subscription `QuotaWindow` and its archive.
#[derive(Debug)]
pub struct QuotaTracker {
    window_secs: i64,
    units_per_window: u64,
    window_path: PathBuf,
    archive_path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<Ledger>,
}

impl QuotaTracker {
    /// Load (or create) the persisted window under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be read or written.
    pub fn open(
        paths: &AppPaths,
        window_len: Duration,
        units_per_window: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let window_path = paths.quota_window_file();
        let window: QuotaWindow = state_file::load_or_default(&window_path)?;
        tracing::debug!(
            window_id = window.window_id,
            units = window.units_consumed,
            "Loaded quota window"
        );

        Ok(Self {
            window_secs: window_len.num_seconds().max(1),
            units_per_window: units_per_window.max(1),
            window_path,
            archive_path: paths.quota_archive_file(),
            clock,
            state: Mutex::new(Ledger {
                window,
                reserved: 0,
            }),
        })
    }

    /// Window bucket containing `at`.
    #[must_use]
    pub fn window_id_at(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.window_secs)
    }

    fn window_start(&self, window_id: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(window_id.saturating_mul(self.window_secs), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Archive and reset the window if the clock has moved past it.
    ///
    /// Must be called with the lock held. Returns `true` if a rollover happened.
    fn roll_over(&self, ledger: &mut Ledger, now: DateTime<Utc>) -> Result<bool> {
        let current = self.window_id_at(now);
        let window = &mut ledger.window;
        if window.window_id == current {
            return Ok(false);
        }

        if window.requests_in_window > 0 {
            state_file::append_line(&self.archive_path, &*window)?;
            tracing::info!(
                window_id = window.window_id,
                units = window.units_consumed,
                requests = window.requests_in_window,
                success_rate = window.success_rate,
                "Archived quota window"
            );
        }

        *window = QuotaWindow::fresh(current, self.window_start(current));
        ledger.reserved = 0;
        state_file::save(&self.window_path, &ledger.window)?;
        Ok(true)
    }

    /// Record one subscription attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the window could not be persisted.
    pub fn record_attempt(&self, success: bool, latency_ms: f64) -> Result<QuotaSnapshot> {
        let now = self.clock.now();
        let mut ledger = self.lock();
        self.roll_over(&mut ledger, now)?;
        ledger.window.record(success, latency_ms);
        state_file::save(&self.window_path, &ledger.window)?;
        Ok(self.snapshot_of(&ledger.window, now))
    }

    /// Hold one unit of the current window for a request about to be sent.
    ///
    /// Returns `None` when consumed plus reserved units already fill the
    /// window.
    ///
    /// # Errors
    ///
    /// Returns an error if a rollover could not be persisted.
    pub fn try_reserve(&self) -> Result<Option<QuotaReservation<'_>>> {
        let now = self.clock.now();
        let mut ledger = self.lock();
        self.roll_over(&mut ledger, now)?;
        if ledger.window.units_consumed + ledger.reserved >= self.units_per_window {
            return Ok(None);
        }
        ledger.reserved += 1;
        Ok(Some(QuotaReservation {
            tracker: self,
            window_id: ledger.window.window_id,
        }))
    }

    /// Percentage of the window's quota consumed (may exceed 100).
    ///
    /// # Errors
    ///
    /// Returns an error if a rollover could not be persisted.
    pub fn current_usage_percent(&self) -> Result<f64> {
        Ok(self.snapshot()?.usage_percent)
    }

    /// Time until the current window ends.
    #[must_use]
    pub fn time_until_reset(&self) -> Duration {
        let now = self.clock.now();
        self.next_reset(now) - now
    }

    fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.window_start(self.window_id_at(now) + 1)
    }

    /// Current window with derived usage figures.
    pub fn snapshot(&self) -> Result<QuotaSnapshot> {
        let now = self.clock.now();
        let mut ledger = self.lock();
        self.roll_over(&mut ledger, now)?;
        Ok(self.snapshot_of(&ledger.window, now))
    }

    fn snapshot_of(&self, window: &QuotaWindow, now: DateTime<Utc>) -> QuotaSnapshot {
        #[allow(clippy::cast_precision_loss)]
        let usage_percent = window.units_consumed as f64 / self.units_per_window as f64 * 100.0;
        let resets_at = self.next_reset(now);
        QuotaSnapshot {
            window: window.clone(),
            units_per_window: self.units_per_window,
            usage_percent,
            resets_at,
            seconds_until_reset: (resets_at - now).num_seconds(),
        }
    }

    /// Replace the current window with an empty one. The archive is kept.
    pub fn reset(&self) -> Result<()> {
        let now = self.clock.now();
        let mut ledger = self.lock();
        let current = self.window_id_at(now);
        ledger.window = QuotaWindow::fresh(current, self.window_start(current));
        state_file::save(&self.window_path, &ledger.window)?;
        Ok(())
    }

    /// Every archived window, oldest first.
    pub fn archived_windows(&self) -> Result<Vec<QuotaWindow>> {
        state_file::read_lines(&self.archive_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn tracker(tmp: &TempDir, clock: &Arc<ManualClock>, quota: u64) -> QuotaTracker {
        QuotaTracker::open(
            &AppPaths::with_state_dir(tmp.path()),
            Duration::hours(5),
            quota,
            clock.clone(),
        )
        .unwrap()
    }

    #[test]
    fn window_id_stable_within_window() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);

        let first = quota.record_attempt(true, 100.0).unwrap().window.window_id;
        for _ in 0..5 {
            clock.advance(Duration::minutes(30));
            quota.record_attempt(false, 50.0).unwrap();
            assert_eq!(quota.snapshot().unwrap().window.window_id, first);
        }
    }

    #[test]
    fn rollover_resets_once_and_archives() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);

        quota.record_attempt(true, 10.0).unwrap();
        quota.record_attempt(true, 30.0).unwrap();
        clock.advance(Duration::hours(5));

        for _ in 0..3 {
            let snap = quota.snapshot().unwrap();
            assert_eq!(snap.window.units_consumed, 0);
            assert_eq!(snap.window.requests_in_window, 0);
        }
        let archive = quota.archived_windows().unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].units_consumed, 2);
        assert!((archive[0].average_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn success_rate_is_incremental() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);

        quota.record_attempt(true, 0.0).unwrap();
        quota.record_attempt(false, 0.0).unwrap();
        quota.record_attempt(true, 0.0).unwrap();
        let snap = quota.record_attempt(true, 0.0).unwrap();
        assert!((snap.window.success_rate - 75.0).abs() < 1e-9);
        assert_eq!(snap.window.units_consumed, 3);
        assert_eq!(snap.window.requests_in_window, 4);
    }

    #[test]
    fn ten_successes_reach_full_usage() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);

        for i in 1..=10 {
            let snap = quota.record_attempt(true, 1.0).unwrap();
            assert!((snap.usage_percent - f64::from(i) * 10.0).abs() < 1e-9);
        }
        assert!(quota.current_usage_percent().unwrap() >= 100.0);
    }

    #[test]
    fn reservations_hold_the_last_unit() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);
        for _ in 0..9 {
            quota.record_attempt(true, 1.0).unwrap();
        }

        let held = quota.try_reserve().unwrap();
        assert!(held.is_some());
        assert!(quota.try_reserve().unwrap().is_none());

        drop(held);
        let again = quota.try_reserve().unwrap();
        assert!(again.is_some());
        quota.record_attempt(true, 1.0).unwrap();
        drop(again);
        assert!(quota.try_reserve().unwrap().is_none());
        assert!(quota.current_usage_percent().unwrap() >= 100.0);
    }

    #[test]
    fn rollover_forgets_stale_reservations() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 1);

        let stale = quota.try_reserve().unwrap();
        assert!(stale.is_some());
        clock.advance(Duration::hours(5));

        let fresh = quota.try_reserve().unwrap();
        assert!(fresh.is_some());
        drop(stale);
        assert!(quota.try_reserve().unwrap().is_none());
        drop(fresh);
        assert!(quota.try_reserve().unwrap().is_some());
    }

    #[test]
    fn window_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        tracker(&tmp, &clock, 10).record_attempt(true, 5.0).unwrap();

        let reopened = tracker(&tmp, &clock, 10);
        assert!((reopened.current_usage_percent().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn time_until_reset_counts_down() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);

        assert_eq!(quota.time_until_reset(), Duration::hours(5));
        clock.advance(Duration::hours(4));
        assert_eq!(quota.time_until_reset(), Duration::hours(1));
    }

    #[test]
    fn reset_keeps_archive() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);
        quota.record_attempt(true, 1.0).unwrap();
        clock.advance(Duration::hours(5));
        quota.record_attempt(true, 1.0).unwrap();

        quota.reset().unwrap();
        assert_eq!(quota.snapshot().unwrap().window.units_consumed, 0);
        assert_eq!(quota.archived_windows().unwrap().len(), 1);
    }

    #[test]
    #[traced_test]
    fn empty_windows_are_not_archived() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_window_start(5));
        let quota = tracker(&tmp, &clock, 10);

        clock.advance(Duration::hours(5));
        quota.snapshot().unwrap();
        assert!(!logs_contain("Archived quota window"));

        quota.record_attempt(true, 1.0).unwrap();
        clock.advance(Duration::hours(5));
        quota.snapshot().unwrap();
        assert!(logs_contain("Archived quota window"));
        assert_eq!(quota.archived_windows().unwrap().len(), 1);
    }
}
