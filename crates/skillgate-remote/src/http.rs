//! Shared HTTP client construction.

use std::time::Duration;

use crate::error::RemoteResult;

pub const USER_AGENT: &str = concat!("skillgate/", env!("CARGO_PKG_VERSION"));

/// Client with the skillgate user agent and a per-request timeout.
pub fn build_client(timeout: Duration) -> RemoteResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// First `max` characters of `text`.
pub(crate) fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
