//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration across the codebase.

use reqwest::Client;
use std::time::Duration;

/// Default timeout for API calls (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Short timeout for connectivity probes (5 seconds).
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for chat-completion passthrough (120 seconds).
pub const PASSTHROUGH_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for downloading update archives (60 seconds).
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("proxyctl/", env!("CARGO_PKG_VERSION"));

/// Create a new HTTP client with the default timeout.
pub fn create_client() -> Client {
    create_client_with_timeout(DEFAULT_TIMEOUT)
}

/// Create a new HTTP client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to create HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_client_returns_valid_client() {
        let client = create_client();
        assert!(std::mem::size_of_val(&client) > 0);
    }

    #[test]
    fn passthrough_timeout_is_two_minutes() {
        assert_eq!(PASSTHROUGH_TIMEOUT, Duration::from_secs(120));
    }

    #[test]
    fn user_agent_carries_crate_version() {
        assert!(USER_AGENT.starts_with("proxyctl/"));
        assert!(USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
