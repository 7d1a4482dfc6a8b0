//! Configuration module for StatusWatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "statuswatch.db")
    pub db_path: String,
    /// JSON file of servers and targets to upsert at start-up
    pub targets_file: Option<String>,
    /// Outbound alert webhook; `None` disables notifications
    pub webhook_url: Option<String>,
    /// Per-probe timeout (default: 5s)
    pub probe_timeout: Duration,
    /// Interval between background sweeps; zero disables them (default: 60s)
    pub check_interval: Duration,
    /// Concurrent probes per sweep (default: 8)
    pub max_concurrent_checks: usize,
    /// Expiry of remembered notification states (default: 24h)
    pub notify_ttl: Duration,
    /// Retries of a contended status write after the first attempt (default: 3)
    pub store_retries: u32,
    /// Pause between those attempts (default: 100ms)
    pub store_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "statuswatch.db".to_string(),
            targets_file: None,
            webhook_url: None,
            probe_timeout: crate::probe::DEFAULT_PROBE_TIMEOUT,
            check_interval: Duration::from_secs(60),
            max_concurrent_checks: 8,
            notify_ttl: Duration::from_secs(24 * 60 * 60),
            store_retries: 3,
            store_backoff: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STATUSWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `STATUSWATCH_DB_PATH`: Database file path (default: "statuswatch.db")
    /// - `STATUSWATCH_TARGETS_FILE`: Seed file of servers and targets (default: unset)
    /// - `STATUSWATCH_WEBHOOK_URL`: Alert webhook (default: unset, alerts disabled)
    /// - `STATUSWATCH_PROBE_TIMEOUT_SECS`: Probe timeout (default: 5)
    /// - `STATUSWATCH_CHECK_INTERVAL_SECS`: Sweep interval, 0 to disable (default: 60)
    /// - `STATUSWATCH_MAX_CONCURRENT_CHECKS`: Sweep concurrency (default: 8)
    /// - `STATUSWATCH_NOTIFY_TTL_SECS`: Dedup memory expiry (default: 86400)
    /// - `STATUSWATCH_STORE_RETRIES`: Write retries under contention, 0 to disable (default: 3)
    /// - `STATUSWATCH_STORE_BACKOFF_MS`: Back-off between attempts (default: 100)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parsed(&lookup, "STATUSWATCH_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("STATUSWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        cfg.targets_file = lookup("STATUSWATCH_TARGETS_FILE").filter(|s| !s.trim().is_empty());
        cfg.webhook_url = lookup("STATUSWATCH_WEBHOOK_URL").filter(|s| !s.trim().is_empty());

        if let Some(secs) = parsed::<u64, _>(&lookup, "STATUSWATCH_PROBE_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.probe_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = parsed(&lookup, "STATUSWATCH_CHECK_INTERVAL_SECS") {
            cfg.check_interval = Duration::from_secs(secs);
        }

        if let Some(n) = parsed::<usize, _>(&lookup, "STATUSWATCH_MAX_CONCURRENT_CHECKS") {
            cfg.max_concurrent_checks = n.max(1);
        }

        if let Some(secs) = parsed(&lookup, "STATUSWATCH_NOTIFY_TTL_SECS") {
            cfg.notify_ttl = Duration::from_secs(secs);
        }

        if let Some(n) = parsed::<u32, _>(&lookup, "STATUSWATCH_STORE_RETRIES") {
            cfg.store_retries = n;
        }

        if let Some(ms) = parsed(&lookup, "STATUSWATCH_STORE_BACKOFF_MS") {
            cfg.store_backoff = Duration::from_millis(ms);
        }

        cfg
    }
}

fn parsed<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
