//! HTTP client utilities.
//!
//! Provides the shared HTTP client used by both backend clients.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{Result, RouterError};

/// Default per-attempt timeout for backend requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
///
/// The timeout applies to each attempt individually; retries get a fresh deadline.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("llm-router/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RouterError::Config(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_custom_timeout() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
        assert!(build_client(DEFAULT_TIMEOUT).is_ok());
    }
}
