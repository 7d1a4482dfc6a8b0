//! StatusWatch - HTTP reachability monitor.
//!
//! Periodically probes targets, keeps current and historical status, tracks
//! downtime intervals, sends deduplicated alerts and serves uptime summaries.

mod aggregate;
mod config;
mod db;
mod monitor;
mod notify;
mod probe;
mod retry;
mod scheduler;
mod web;

use config::ServerConfig;
use db::{StatusRepository, Store};
use monitor::Monitor;
use notify::{Deduper, TtlCache, WebhookSink};
use retry::RetryPolicy;
use scheduler::Scheduler;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statuswatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting StatusWatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    if let Some(path) = &cfg.targets_file {
        let count = store.seed_from_file(path)?;
        tracing::info!("Seeded {} targets from {}", count, path);
    }
    if store.get_targets()?.is_empty() {
        tracing::warn!("No targets configured; set STATUSWATCH_TARGETS_FILE to add some");
    }

    // Checks share one HTTP client for probes and webhooks
    let client = probe::build_client()?;
    let sink = WebhookSink::new(client.clone(), cfg.webhook_url.clone());
    if !sink.is_enabled() {
        tracing::info!("No webhook configured, alerts are disabled");
    }
    let deduper = Deduper::new(Arc::new(TtlCache::new(cfg.notify_ttl)), sink);
    let retry = RetryPolicy::new(cfg.store_retries.saturating_add(1), cfg.store_backoff);
    let monitor = Arc::new(Monitor::new(store.clone(), client, deduper, retry, cfg.probe_timeout));

    // Start scheduler
    let scheduler = Scheduler::new(monitor.clone(), cfg.check_interval, cfg.max_concurrent_checks);
    let _sweeps = if cfg.check_interval.is_zero() {
        tracing::info!("Background sweeps disabled");
        None
    } else {
        Some(scheduler.start())
    };

    // Start web server
    let server = Server::new(cfg, store, monitor);
    let result = server.start().await;
    scheduler.stop();
    result
}
