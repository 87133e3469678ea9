//! Routing core: classification, backend clients, quota, budget and orchestration.

pub mod backend;
pub mod budget;
pub mod classifier;
pub mod http;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod quota;
pub mod status;

pub use backend::{BackendClient, RetryPolicy, backoff_delay};
pub use budget::{ALERT_THRESHOLDS, BudgetAlert, BudgetMonitor, CostComparison, Pricing};
pub use classifier::{FailureKind, Outcome, TransportFailure, classify};
pub use models::{
    ActiveProvider, Completion, Message, Provider, RequestOptions, Role, TokenUsage,
};
pub use orchestrator::{FallbackPolicy, Orchestrator, ProviderState, UsageCounters};
pub use quota::{QuotaReservation, QuotaSnapshot, QuotaTracker, QuotaWindow};
pub use status::RouterStatus;
