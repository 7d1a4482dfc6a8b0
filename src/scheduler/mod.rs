//! Scheduler module for periodic sweeps over all targets.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::db::{HealthState, StatusRepository};
use crate::monitor::Monitor;
use crate::notify::AlertSink;

/// Result tally of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub up: usize,
    pub failing: usize,
    pub errors: usize,
}

/// Runs a check for every target at a fixed interval.
pub struct Scheduler<R, S> {
    monitor: Arc<Monitor<R, S>>,
    interval: Duration,
    max_concurrent: usize,
    stop_tx: broadcast::Sender<()>,
}

impl<R, S> Scheduler<R, S>
where
    R: StatusRepository + 'static,
    S: AlertSink + 'static,
{
    pub fn new(monitor: Arc<Monitor<R, S>>, interval: Duration, max_concurrent: usize) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            monitor,
            interval,
            max_concurrent: max_concurrent.max(1),
            stop_tx,
        }
    }

    /// Start the background sweep loop.
    pub fn start(&self) -> JoinHandle<()> {
        let monitor = self.monitor.clone();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut stop_rx = self.stop_tx.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Scheduler: sweeping every {:?} with up to {} concurrent checks",
            self.interval,
            self.max_concurrent
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        let stats = run_sweep(&monitor, &semaphore).await;
                        tracing::info!(
                            "Sweep finished: {} up, {} failing, {} errors",
                            stats.up,
                            stats.failing,
                            stats.errors
                        );
                        monitor.deduper().cache().purge_expired();
                    }
                }
            }
            tracing::info!("Scheduler stopped");
        })
    }

    /// Stop the sweep loop after the current sweep.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

/// Check every target once, at most `semaphore` permits at a time.
pub async fn run_sweep<R, S>(monitor: &Arc<Monitor<R, S>>, semaphore: &Arc<Semaphore>) -> SweepStats
where
    R: StatusRepository + 'static,
    S: AlertSink + 'static,
{
    let mut stats = SweepStats::default();
    let targets = match monitor.repo().get_targets() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Scheduler: Failed to get targets: {}", e);
            return stats;
        }
    };

    let mut tasks = JoinSet::new();
    for target in targets {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let monitor = monitor.clone();

        tasks.spawn(async move {
            let _permit = permit;

            // Spread probes a little to avoid bursts against shared hosts
            let jitter = rand::random::<u64>() % 100;
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            match monitor.check_target(&target).await {
                Ok(resp) => Some(resp.status),
                Err(e) => {
                    tracing::error!("Check failed for {}: {}", target.name, e);
                    None
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(HealthState::Up)) => stats.up += 1,
            Ok(Some(_)) => stats.failing += 1,
            Ok(None) => stats.errors += 1,
            Err(e) => {
                tracing::error!("Check task panicked: {}", e);
                stats.errors += 1;
            }
        }
    }

    stats
}
