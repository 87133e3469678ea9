//! E2E tests for the llm-router binary.
//!
//! Covers:
//! - Config inspection with masked credentials
//! - Status output with no backends configured
//! - Exit codes for unavailable backends and refused resets
//! - A full request served through a mock backend

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::MESSAGES_PATH;
use common::logger::TestLogger;
use llm_router::{TestDir, make_test_completion_json};

const CREDENTIAL_VARS: &[&str] = &[
    "LLM_ROUTER_SUBSCRIPTION_TOKEN",
    "CLAUDE_CODE_OAUTH_TOKEN",
    "LLM_ROUTER_METERED_API_KEY",
    "ANTHROPIC_API_KEY",
];

/// A command isolated from the caller's credentials, config file and state.
fn router_cmd(dir: &TestDir) -> Command {
    let mut cmd = Command::cargo_bin("llm-router").expect("binary should build");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd.env("LLM_ROUTER_CONFIG", dir.file_path("config.toml"))
        .env("LLM_ROUTER_STATE_DIR", dir.file_path("state"))
        .env("NO_COLOR", "1")
        .env_remove("LLM_ROUTER_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = TestDir::new();
    router_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("request"))
        .stdout(predicate::str::contains("compare"));
}

#[test]
fn config_show_masks_credentials() {
    let log = TestLogger::new("config_show_masks_credentials");
    let dir = TestDir::new();
    router_cmd(&dir)
        .env("LLM_ROUTER_METERED_API_KEY", "sk-very-secret-value")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****alue"))
        .stdout(predicate::str::contains("[environment variable]"))
        .stdout(predicate::str::contains("sk-very-secret-value").not());
    log.finish_ok();
}

#[test]
fn config_path_prints_config_location() {
    let dir = TestDir::new();
    router_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn status_json_without_backends() {
    let log = TestLogger::new("status_json_without_backends");
    let dir = TestDir::new();
    let output = router_cmd(&dir)
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["schemaVersion"], "llm-router.v1");
    assert_eq!(value["command"], "status");
    assert_eq!(value["data"]["active_provider"], "none");
    assert_eq!(value["data"]["fallback_active"], false);
    assert_eq!(value["data"]["subscription_configured"], false);
    assert!(dir.file_exists("state/provider-state.json"));
    log.finish_ok();
}

#[test]
fn request_without_backends_exits_unavailable() {
    let dir = TestDir::new();
    router_cmd(&dir)
        .args(["request", "-p", "hello"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("LLMR-A002"));
}

#[test]
fn request_error_json_is_structured() {
    let dir = TestDir::new();
    let output = router_cmd(&dir)
        .args(["request", "-p", "hello", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    // Log lines may precede the error document on stderr.
    let stderr = String::from_utf8(output.stderr).unwrap();
    let last = stderr.lines().rfind(|l| !l.trim().is_empty()).unwrap();
    let value: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(value["errorCode"], "LLMR-A002");
    assert_eq!(value["exitCode"], 2);
}

#[test]
fn reset_requires_confirmation() {
    let dir = TestDir::new();
    router_cmd(&dir)
        .arg("reset")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--yes"));

    router_cmd(&dir)
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Router state reset."));
}

#[test]
fn invalid_temperature_is_a_config_error() {
    let dir = TestDir::new();
    router_cmd(&dir)
        .args(["request", "-p", "hi", "--temperature", "1.5"])
        .assert()
        .code(3);
}

#[test]
fn malformed_config_file_fails_cleanly() {
    let dir = TestDir::new();
    dir.create_file("config.toml", "[subscription\nquota_per_window = ");
    router_cmd(&dir)
        .arg("status")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("config parse error"));
}

#[test]
fn compare_reports_cheaper_backend() {
    let dir = TestDir::new();
    router_cmd(&dir)
        .arg("compare")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cheaper"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_is_served_by_metered_backend() {
    let log = TestLogger::new("request_is_served_by_metered_backend");
    log.phase("setup");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(make_test_completion_json("Hello from the mock")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TestDir::new();
    dir.create_file(
        "config.toml",
        &format!(
            "[metered]\napi_key = \"sk-metered-test\"\nbase_url = \"{}\"\n\n\
             [fallback]\nretry_base_delay_ms = 1\n",
            server.uri()
        ),
    );

    log.phase("act");
    let mut cmd = router_cmd(&dir);
    let assert = tokio::task::spawn_blocking(move || {
        cmd.args(["request", "-p", "hello"]).assert()
    })
    .await
    .unwrap();

    log.phase("verify");
    assert
        .success()
        .stdout(predicate::str::contains("Hello from the mock"))
        .stdout(predicate::str::contains("[metered · claude-test"));
    log.finish_ok();
}
