//! llm-router - Resilient multi-backend request router
//!
//! Routes text-generation requests between a quota-limited subscription
//! backend and a pay-per-request metered backend, with automatic fallback,
//! recovery probes, quota accounting and durable state.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::core::{Completion, Message, Orchestrator, Provider, RequestOptions, RouterStatus};
pub use error::{ExitCode, Result, RouterError};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
