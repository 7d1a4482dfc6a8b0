//! Probe module for reachability checks.
//!
//! A probe never errors: network failure is a classified outcome (code `0`).

mod http;

pub use http::*;

use std::time::Duration;

/// Raw result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// HTTP status code, or `0` when no response was received.
    pub code: u16,
    /// End-to-end duration including failure paths.
    pub elapsed_ms: u64,
}

/// Default per-request timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the shared HTTP client used for probes.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("statuswatch/", env!("CARGO_PKG_VERSION")))
        .build()
}
