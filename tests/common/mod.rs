//! Shared helpers for integration tests.
//!
//! # Modules
//!
//! - `logger`: Structured test logging
#![allow(dead_code)]

pub mod logger;

use std::sync::Arc;

use chrono::Duration;
use llm_router::storage::Config;
use llm_router::util::Clock;
use llm_router::{
    ManualClock, Message, Orchestrator, RequestOptions, TestDir, make_test_completion_json,
    make_test_file_config, resolve_test_config,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MESSAGES_PATH: &str = "/v1/messages";

/// A router wired to mock backends with a manual clock and a private state dir.
pub struct Harness {
    pub dir: TestDir,
    pub clock: Arc<ManualClock>,
    pub config: Config,
    pub router: Orchestrator,
}

impl Harness {
    /// Build a router for the given backends. `None` leaves that backend unconfigured.
    pub fn new(subscription: Option<&MockServer>, metered: Option<&MockServer>) -> Self {
        let config = make_test_file_config(
            subscription.map(MockServer::uri).as_deref(),
            metered.map(MockServer::uri).as_deref(),
        );
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let dir = TestDir::new();
        let clock = Arc::new(ManualClock::at_window_start(
            i64::from(config.subscription.quota_window_hours),
        ));
        let router = build_router(&dir, &config, &clock);
        Self {
            dir,
            clock,
            config,
            router,
        }
    }

    /// Drop the router and build a fresh one over the same state directory.
    pub fn restart(self) -> Self {
        let Self {
            dir,
            clock,
            config,
            router,
        } = self;
        drop(router);
        let router = build_router(&dir, &config, &clock);
        Self {
            dir,
            clock,
            config,
            router,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn ask(&self, prompt: &str) -> llm_router::Result<llm_router::Completion> {
        self.router
            .request(&[Message::user(prompt)], &RequestOptions::default())
            .await
    }
}

fn build_router(dir: &TestDir, config: &Config, clock: &Arc<ManualClock>) -> Orchestrator {
    let resolved = resolve_test_config(dir.path(), config);
    let clock: Arc<dyn Clock> = clock.clone();
    Orchestrator::with_clock(&resolved, clock).expect("router should build")
}

/// Mount a 200 completion answering `text`.
pub async fn mount_success(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(make_test_completion_json(text)))
        .mount(server)
        .await;
}

/// Mount an error response with a JSON error body.
pub async fn mount_error(server: &MockServer, status: u16, error_type: &str, message: &str) {
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(error_body(error_type, message)))
        .mount(server)
        .await;
}

#[must_use]
pub fn error_body(error_type: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "error": {"type": error_type, "message": message}
    })
}
