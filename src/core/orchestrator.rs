//! Backend selection, fallback and recovery.
//!
//! The [`Orchestrator`] owns the persisted [`ProviderState`] and is the single
//! entry point for callers. It routes to the Subscription backend while that
//! backend is healthy and has quota, falls back to the Metered backend on
//! credential or quota failures (or after a run of transient failures), and
//! periodically probes the Subscription backend to return from fallback.
//!
//! Probes triggered by [`Orchestrator::request`] run as detached tasks while
//! the Metered backend can serve the request that claimed the slot.
//!
//! ## Locking
//!
//! `ProviderState` lives behind one mutex and is written to disk before the
//! lock is released. The lock is never held across network I/O or backoff
//! sleeps. When both are needed, the provider lock is taken before the quota
//! lock.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::core::backend::{BackendClient, RetryPolicy};
use crate::core::budget::{BudgetMonitor, CostComparison, Pricing};
use crate::core::classifier::FailureKind;
use crate::core::http::build_client;
use crate::core::models::{ActiveProvider, Completion, Message, Provider, RequestOptions};
use crate::core::quota::QuotaTracker;
use crate::core::status::RouterStatus;
use crate::error::{BackendFailure, Result, RouterError};
use crate::storage::{ResolvedConfig, state_file};
use crate::util::{Clock, SystemClock, format_duration};

/// Subscription stays preferred when its exhausted window resets this soon.
const RESET_GRACE_MINUTES: i64 = 30;

/// Prompt sent by recovery probes.
const PROBE_PROMPT: &str = "ping";

// =============================================================================
// Persisted state
// =============================================================================

/// Requests served per backend. Only an explicit reset clears these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub subscription_requests: u64,
    pub metered_requests: u64,
    pub fallback_activations: u64,
}

impl UsageCounters {
    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.subscription_requests + self.metered_requests
    }
}

/// Routing state. Persisted to `provider-state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderState {
    pub active_provider: ActiveProvider,
    pub consecutive_subscription_failures: u32,
    pub last_subscription_failure_at: Option<DateTime<Utc>>,
    /// First failure of the current unbroken Subscription failure run.
    pub failure_streak_started_at: Option<DateTime<Utc>>,
    pub fallback_active: bool,
    /// Failure that triggered the current fallback.
    pub fallback_reason: Option<FailureKind>,
    pub fallback_started_at: Option<DateTime<Utc>>,
    pub last_recovery_attempt_at: Option<DateTime<Utc>>,
    pub usage_counters: UsageCounters,
    /// When this state record was first created; base for cost extrapolation.
    pub created_at: Option<DateTime<Utc>>,
}

/// Thresholds that drive fallback and recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub max_consecutive_failures: u32,
    pub fallback_delay: Duration,
    pub oauth_retry_interval: Duration,
}

impl FallbackPolicy {
    #[must_use]
    pub const fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            fallback_delay: config.fallback_delay,
            oauth_retry_interval: config.oauth_retry_interval,
        }
    }
}

/// State guarded by the provider lock.
#[derive(Debug)]
struct Inner {
    state: ProviderState,
    /// Credentials rejected with Unauthorized in this process. Not persisted.
    rejected: BTreeSet<Provider>,
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Recovery probe
// =============================================================================

/// A claimed recovery slot. Owns everything it needs so it can outlive the
/// request that claimed it.
#[derive(Debug)]
struct RecoveryProbe {
    client: BackendClient,
    inner: Arc<Mutex<Inner>>,
    state_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl RecoveryProbe {
    async fn run(self) -> Result<bool> {
        tracing::info!("Probing subscription backend for recovery");
        let result = self
            .client
            .send_once(&[Message::user(PROBE_PROMPT)], &RequestOptions::probe())
            .await;

        let mut inner = lock_inner(&self.inner);
        let recovered = match result {
            Ok(_) => {
                inner.rejected.remove(&Provider::Subscription);
                let state = &mut inner.state;
                state.fallback_active = false;
                state.fallback_reason = None;
                state.fallback_started_at = None;
                state.consecutive_subscription_failures = 0;
                state.failure_streak_started_at = None;
                state.active_provider = ActiveProvider::Subscription;
                tracing::info!("Subscription backend recovered, leaving fallback");
                true
            }
            Err(failure) => {
                inner.state.last_subscription_failure_at = Some(self.clock.now());
                tracing::info!(%failure, "Recovery probe failed, staying in fallback");
                false
            }
        };
        state_file::save(&self.state_path, &inner.state)?;
        Ok(recovered)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Routes requests across the configured backends.
#[derive(Debug)]
pub struct Orchestrator {
    subscription: Option<BackendClient>,
    metered: Option<BackendClient>,
    quota: Arc<QuotaTracker>,
    budget: BudgetMonitor,
    policy: FallbackPolicy,
    clock: Arc<dyn Clock>,
    state_path: PathBuf,
    inner: Arc<Mutex<Inner>>,
    /// Probe spawned by the last request that found one due.
    pending_probe: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build a router from resolved configuration using the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read or written, or the
    /// HTTP client cannot be built.
    pub fn new(config: &ResolvedConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a router that reads time from `clock`.
    pub fn with_clock(config: &ResolvedConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let paths = config.paths();
        let quota = Arc::new(QuotaTracker::open(
            &paths,
            config.quota_window,
            config.quota_per_window,
            Arc::clone(&clock),
        )?);
        let http = build_client(config.timeout)?;

        let subscription = config.subscription_token.as_ref().map(|token| {
            BackendClient::new(
                Provider::Subscription,
                http.clone(),
                &config.subscription_base_url,
                token,
                &config.subscription_model,
                RetryPolicy::for_provider(Provider::Subscription, config.retry_base_delay),
            )
            .with_quota(Arc::clone(&quota))
        });
        let metered = config.metered_api_key.as_ref().map(|key| {
            BackendClient::new(
                Provider::Metered,
                http.clone(),
                &config.metered_base_url,
                key,
                &config.metered_model,
                RetryPolicy::for_provider(Provider::Metered, config.retry_base_delay),
            )
        });

        let state_path = paths.provider_state_file();
        let mut state: ProviderState = state_file::load_or_default(&state_path)?;
        state.created_at.get_or_insert_with(|| clock.now());

        let router = Self {
            subscription,
            metered,
            quota,
            budget: BudgetMonitor::new(Pricing {
                subscription_monthly_usd: config.subscription_monthly_price_usd,
                metered_per_request_usd: config.metered_cost_per_request_usd,
            }),
            policy: FallbackPolicy::from_config(config),
            clock,
            state_path,
            inner: Arc::new(Mutex::new(Inner {
                state,
                rejected: BTreeSet::new(),
            })),
            pending_probe: Mutex::new(None),
        };

        {
            let mut inner = router.lock();
            router.refresh_active(&mut inner)?;
            router.persist(&inner.state)?;
            tracing::debug!(
                active = %inner.state.active_provider,
                fallback = inner.state.fallback_active,
                "Router initialized"
            );
        }
        Ok(router)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    fn persist(&self, state: &ProviderState) -> Result<()> {
        state_file::save(&self.state_path, state)
    }

    const fn client(&self, provider: Provider) -> Option<&BackendClient> {
        match provider {
            Provider::Subscription => self.subscription.as_ref(),
            Provider::Metered => self.metered.as_ref(),
        }
    }

    /// Whether a backend has credentials at all.
    #[must_use]
    pub const fn is_configured(&self, provider: Provider) -> bool {
        self.client(provider).is_some()
    }

    fn usable(&self, inner: &Inner, provider: Provider) -> bool {
        self.is_configured(provider) && !inner.rejected.contains(&provider)
    }

    // =========================================================================
    // Provider determination
    // =========================================================================

    /// Re-evaluate which backend should serve requests and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if state could not be persisted.
    pub fn determine_provider(&self) -> Result<ActiveProvider> {
        let mut inner = self.lock();
        let before = inner.state.active_provider;
        self.refresh_active(&mut inner)?;
        if inner.state.active_provider != before {
            self.persist(&inner.state)?;
        }
        Ok(inner.state.active_provider)
    }

    fn refresh_active(&self, inner: &mut Inner) -> Result<()> {
        let next = self.select(inner)?;
        if next != inner.state.active_provider {
            tracing::info!(
                from = %inner.state.active_provider,
                to = %next,
                "Active backend changed"
            );
            inner.state.active_provider = next;
        }
        Ok(())
    }

    fn select(&self, inner: &Inner) -> Result<ActiveProvider> {
        let metered = self.usable(inner, Provider::Metered);

        if inner.state.fallback_active {
            return Ok(if metered {
                ActiveProvider::Metered
            } else {
                ActiveProvider::None
            });
        }

        if self.usable(inner, Provider::Subscription) {
            let snapshot = self.quota.snapshot()?;
            let has_quota = snapshot.usage_percent < 100.0;
            let resets_soon = snapshot.seconds_until_reset <= RESET_GRACE_MINUTES * 60;
            if has_quota || resets_soon || !metered {
                return Ok(ActiveProvider::Subscription);
            }
            return Ok(ActiveProvider::Metered);
        }

        Ok(if metered {
            ActiveProvider::Metered
        } else {
            ActiveProvider::None
        })
    }

    // =========================================================================
    // Request path
    // =========================================================================

    /// Serve one request, falling back between backends as needed.
    ///
    /// At most one Subscription call (with its local retries) and one Metered
    /// call are made per request. A recovery probe that falls due here runs in
    /// the background when Metered is usable; see
    /// [`Self::wait_for_recovery_probe`].
    ///
    /// # Errors
    ///
    /// Returns `NoProviderAvailable` when nothing can serve the request, the
    /// single backend error when only one backend was tried, or
    /// `AllProvidersFailed` when both were.
    pub async fn request(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<Completion> {
        self.start_recovery_probe_if_due().await;

        let (active, metered_usable) = {
            let mut inner = self.lock();
            let before = inner.state.active_provider;
            self.refresh_active(&mut inner)?;
            if inner.state.active_provider != before {
                self.persist(&inner.state)?;
            }
            (
                inner.state.active_provider,
                self.usable(&inner, Provider::Metered),
            )
        };

        match active {
            ActiveProvider::None => Err(RouterError::NoProviderAvailable),
            ActiveProvider::Metered => self.send_metered(messages, options, Vec::new()).await,
            ActiveProvider::Subscription => {
                self.send_subscription(messages, options, metered_usable)
                    .await
            }
        }
    }

    async fn send_subscription(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        metered_usable: bool,
    ) -> Result<Completion> {
        let Some(client) = &self.subscription else {
            return Err(RouterError::NoProviderAvailable);
        };

        let Some(reservation) = self.quota.try_reserve()? else {
            if metered_usable {
                tracing::info!("Subscription window quota used up, routing request to metered");
                return self.send_metered(messages, options, Vec::new()).await;
            }
            return Err(RouterError::QuotaExhausted {
                provider: Provider::Subscription,
                message: format!(
                    "window quota used up, resets in {}",
                    format_duration(self.quota.time_until_reset())
                ),
            });
        };

        let result = client.send(messages, options).await;
        drop(reservation);
        self.check_budget();

        match result {
            Ok(completion) => {
                self.on_subscription_success()?;
                Ok(completion)
            }
            Err(failure) if failure.kind.is_caller_error() => {
                tracing::info!(%failure, "Subscription refused the request itself");
                Err(RouterError::from_failure(&failure))
            }
            Err(failure) => {
                self.on_subscription_failure(&failure)?;
                let metered_usable = {
                    let inner = self.lock();
                    self.usable(&inner, Provider::Metered)
                };
                let failures = vec![failure];
                if metered_usable {
                    self.send_metered(messages, options, failures).await
                } else {
                    Err(aggregate(failures))
                }
            }
        }
    }

    async fn send_metered(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        mut failures: Vec<BackendFailure>,
    ) -> Result<Completion> {
        let Some(client) = &self.metered else {
            return Err(aggregate(failures));
        };

        match client.send(messages, options).await {
            Ok(completion) => {
                let mut inner = self.lock();
                inner.state.usage_counters.metered_requests += 1;
                self.persist(&inner.state)?;
                Ok(completion)
            }
            Err(failure) => {
                self.on_metered_failure(&failure)?;
                failures.push(failure);
                Err(aggregate(failures))
            }
        }
    }

    fn on_subscription_success(&self) -> Result<()> {
        let mut inner = self.lock();
        let state = &mut inner.state;
        state.consecutive_subscription_failures = 0;
        state.failure_streak_started_at = None;
        state.usage_counters.subscription_requests += 1;
        self.persist(&inner.state)
    }

    fn on_subscription_failure(&self, failure: &BackendFailure) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.state.last_subscription_failure_at = Some(now);
        inner.state.consecutive_subscription_failures += 1;
        let streak_started = *inner.state.failure_streak_started_at.get_or_insert(now);

        if failure.kind.is_terminal_for_backend() {
            if failure.kind == FailureKind::Unauthorized {
                inner.rejected.insert(Provider::Subscription);
            }
            self.activate_fallback(&mut inner, now, failure.kind);
        } else {
            let failures = inner.state.consecutive_subscription_failures;
            let persisted_for = now - streak_started;
            if failures >= self.policy.max_consecutive_failures
                || persisted_for >= self.policy.fallback_delay
            {
                self.activate_fallback(&mut inner, now, failure.kind);
            } else {
                tracing::info!(
                    failures,
                    max = self.policy.max_consecutive_failures,
                    kind = %failure.kind,
                    "Subscription failure below fallback threshold"
                );
            }
        }

        self.persist(&inner.state)
    }

    fn on_metered_failure(&self, failure: &BackendFailure) -> Result<()> {
        tracing::warn!(%failure, "Metered backend failed");
        if failure.kind != FailureKind::Unauthorized {
            return Ok(());
        }

        let mut inner = self.lock();
        inner.rejected.insert(Provider::Metered);
        self.refresh_active(&mut inner)?;
        self.persist(&inner.state)
    }

    fn activate_fallback(&self, inner: &mut Inner, now: DateTime<Utc>, reason: FailureKind) {
        if inner.state.fallback_active {
            return;
        }

        let target = if self.usable(inner, Provider::Metered) {
            ActiveProvider::Metered
        } else {
            ActiveProvider::None
        };

        let state = &mut inner.state;
        state.fallback_active = true;
        state.fallback_reason = Some(reason);
        state.fallback_started_at = Some(now);
        state.last_recovery_attempt_at = None;
        state.active_provider = target;
        state.usage_counters.fallback_activations += 1;

        tracing::warn!(
            %reason,
            active = %target,
            activations = state.usage_counters.fallback_activations,
            "Subscription fallback activated"
        );
    }

    fn check_budget(&self) {
        match self.quota.snapshot() {
            Ok(snapshot) => {
                for alert in self
                    .budget
                    .check_thresholds(snapshot.usage_percent, snapshot.window.window_id)
                {
                    tracing::warn!(
                        threshold = alert.threshold,
                        usage_percent = alert.usage_percent,
                        "{alert}"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read quota for budget check"),
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    fn recovery_due(&self, state: &ProviderState, now: DateTime<Utc>) -> bool {
        state.fallback_active
            && state
                .last_recovery_attempt_at
                .or(state.fallback_started_at)
                .is_none_or(|since| now - since >= self.policy.oauth_retry_interval)
    }

    /// Claim the recovery slot if a probe is due.
    ///
    /// The slot is claimed under the lock, so concurrent callers never probe
    /// twice in one interval.
    fn claim_recovery_probe(&self) -> Result<Option<RecoveryProbe>> {
        let Some(client) = &self.subscription else {
            return Ok(None);
        };

        let now = self.clock.now();
        let mut inner = self.lock();
        if !self.recovery_due(&inner.state, now) {
            return Ok(None);
        }
        inner.state.last_recovery_attempt_at = Some(now);
        self.persist(&inner.state)?;

        Ok(Some(RecoveryProbe {
            client: client.clone(),
            inner: Arc::clone(&self.inner),
            state_path: self.state_path.clone(),
            clock: Arc::clone(&self.clock),
        }))
    }

    /// Probe the Subscription backend if fallback is active and the retry
    /// interval has elapsed, waiting for the outcome.
    ///
    /// Returns `None` when no probe was due, otherwise whether the backend
    /// recovered.
    ///
    /// # Errors
    ///
    /// Returns an error if state could not be persisted.
    pub async fn probe_recovery_if_due(&self) -> Result<Option<bool>> {
        match self.claim_recovery_probe()? {
            Some(probe) => probe.run().await.map(Some),
            None => Ok(None),
        }
    }

    /// Start a due recovery probe. It runs in the background while Metered
    /// can serve requests, and inline when nothing else could serve this one.
    async fn start_recovery_probe_if_due(&self) {
        let probe = match self.claim_recovery_probe() {
            Ok(Some(probe)) => probe,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to claim recovery probe slot");
                return;
            }
        };

        let metered_usable = {
            let inner = self.lock();
            self.usable(&inner, Provider::Metered)
        };
        if !metered_usable {
            if let Err(e) = probe.run().await {
                tracing::warn!(error = %e, "Failed to record recovery probe outcome");
            }
            return;
        }

        let handle = tokio::spawn(async move {
            if let Err(e) = probe.run().await {
                tracing::warn!(error = %e, "Failed to record recovery probe outcome");
            }
        });
        *self
            .pending_probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Wait for the recovery probe started by the last [`Self::request`], if any.
    pub async fn wait_for_recovery_probe(&self) {
        let handle = self
            .pending_probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Recovery probe task did not finish");
            }
        }
    }

    // =========================================================================
    // Status and administration
    // =========================================================================

    /// Snapshot of routing, quota and cost state.
    ///
    /// # Errors
    ///
    /// Returns an error if a quota rollover could not be persisted.
    pub fn status(&self) -> Result<RouterStatus> {
        let now = self.clock.now();
        let quota = self.quota.snapshot()?;
        let (state, rejected) = {
            let inner = self.lock();
            (
                inner.state.clone(),
                inner.rejected.iter().copied().collect::<Vec<_>>(),
            )
        };

        let next_recovery_probe_at = (state.fallback_active
            && self.is_configured(Provider::Subscription))
        .then(|| {
            state
                .last_recovery_attempt_at
                .or(state.fallback_started_at)
                .map_or(now, |since| since + self.policy.oauth_retry_interval)
        });

        Ok(RouterStatus {
            generated_at: now,
            active_provider: state.active_provider,
            fallback_active: state.fallback_active,
            fallback_reason: state.fallback_reason,
            fallback_started_at: state.fallback_started_at,
            consecutive_subscription_failures: state.consecutive_subscription_failures,
            last_subscription_failure_at: state.last_subscription_failure_at,
            failure_streak_started_at: state.failure_streak_started_at,
            last_recovery_attempt_at: state.last_recovery_attempt_at,
            next_recovery_probe_at,
            usage_stats: state.usage_counters,
            quota_usage_percent: quota.usage_percent,
            time_until_reset_secs: quota.seconds_until_reset,
            cost: self.compare(&state, now),
            quota,
            subscription_configured: self.is_configured(Provider::Subscription),
            metered_configured: self.is_configured(Provider::Metered),
            rejected_credentials: rejected,
            alerts_fired: self.budget.alerts_fired(),
            thresholds_notified: self.budget.notified(),
        })
    }

    /// Monthly cost of serving the observed request rate on each backend.
    #[must_use]
    pub fn compare_providers(&self) -> CostComparison {
        let state = self.lock().state.clone();
        self.compare(&state, self.clock.now())
    }

    fn compare(&self, state: &ProviderState, now: DateTime<Utc>) -> CostComparison {
        let observed = state.created_at.map_or_else(Duration::zero, |t| now - t);
        self.budget
            .compare_providers(state.usage_counters.total_requests(), observed)
    }

    /// Restore provider state, the current quota window and alert state to
    /// defaults. Archived quota windows are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset state could not be persisted.
    pub fn reset(&self) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.quota.reset()?;
        inner.state = ProviderState {
            created_at: Some(now),
            ..ProviderState::default()
        };
        inner.rejected.clear();
        self.refresh_active(&mut inner)?;
        self.persist(&inner.state)?;
        drop(inner);

        self.budget.reset();
        tracing::info!("Router state reset");
        Ok(())
    }

    /// Copy of the current persisted state.
    #[must_use]
    pub fn provider_state(&self) -> ProviderState {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }
}

/// Collapse per-backend failures into the error returned to the caller.
fn aggregate(mut failures: Vec<BackendFailure>) -> RouterError {
    match failures.len() {
        0 => RouterError::NoProviderAvailable,
        1 => {
            let failure = failures.remove(0);
            RouterError::from_failure(&failure)
        }
        _ => RouterError::AllProvidersFailed { failures },
    }
}
