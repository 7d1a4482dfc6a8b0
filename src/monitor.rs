//! The check operation: probe, classify, persist, notify.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db::{DbError, DowntimeAction, HealthState, StatusRepository, Target};
use crate::notify::{AlertSink, Deduper, WebhookSink};
use crate::probe::run_http_probe;
use crate::retry::{RetryError, RetryPolicy};

/// Format used for timestamps returned to callers.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Check operation errors. Network failure is not one of them.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("missing required parameter: {0}")]
    Validation(&'static str),
    #[error("unknown target: {0}")]
    NotFound(String),
    #[error("storage busy, gave up after {attempts} attempts")]
    TransientStorage { attempts: u32 },
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// Input of a check. Both fields are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckRequest {
    pub name: Option<String>,
    pub url: Option<String>,
}

impl CheckRequest {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            url: Some(url.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResponse {
    pub name: String,
    pub url: String,
    pub status: HealthState,
    pub response_ms: u64,
    pub checked_at: String,
}

pub fn format_local(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format(DISPLAY_TIME_FORMAT).to_string()
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, MonitorError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MonitorError::Validation(field)),
    }
}

/// Runs checks against a status repository.
pub struct Monitor<R, S = WebhookSink> {
    repo: Arc<R>,
    client: reqwest::Client,
    deduper: Deduper<S>,
    retry: RetryPolicy,
    probe_timeout: Duration,
}

impl<R: StatusRepository, S: AlertSink> Monitor<R, S> {
    pub fn new(
        repo: Arc<R>,
        client: reqwest::Client,
        deduper: Deduper<S>,
        retry: RetryPolicy,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            client,
            deduper,
            retry,
            probe_timeout,
        }
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn deduper(&self) -> &Deduper<S> {
        &self.deduper
    }

    /// Probe the requested URL for a known target and record the result.
    ///
    /// Returns a definite health state for any valid target; errors only for
    /// bad input, an unknown name, or storage that stayed contended.
    pub async fn check(&self, req: &CheckRequest) -> Result<CheckResponse, MonitorError> {
        let name = required(req.name.as_deref(), "name")?;
        let url = required(req.url.as_deref(), "url")?;

        let target = self
            .repo
            .find_target(name)?
            .ok_or_else(|| MonitorError::NotFound(name.to_string()))?;

        // No storage lock is held while probing.
        let outcome = run_http_probe(&self.client, url, self.probe_timeout).await;
        let state = HealthState::from_code(outcome.code);
        let checked_at = Utc::now();

        let action = self
            .retry
            .run(|| self.repo.record_check(target.id, state, outcome.code, checked_at))
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => {
                    tracing::error!("Giving up recording check for {} after {} attempts: {}", target.name, attempts, last);
                    MonitorError::TransientStorage { attempts }
                }
                RetryError::Fatal(e) => MonitorError::Storage(e),
            })?;

        log_transition(&target, &action);

        self.deduper
            .observe(&target.name, url, state, outcome.code, checked_at)
            .await;

        Ok(CheckResponse {
            name: target.name,
            url: url.to_string(),
            status: state,
            response_ms: outcome.elapsed_ms,
            checked_at: format_local(checked_at),
        })
    }

    /// Check a stored target against its own URL.
    pub async fn check_target(&self, target: &Target) -> Result<CheckResponse, MonitorError> {
        self.check(&CheckRequest::new(&target.name, &target.url)).await
    }
}

fn log_transition(target: &Target, action: &DowntimeAction) {
    match action {
        DowntimeAction::None => {}
        DowntimeAction::Open { state, .. } => {
            tracing::info!("{}: downtime opened ({})", target.name, state)
        }
        DowntimeAction::Retag { state, .. } => {
            tracing::info!("{}: downtime now {}", target.name, state)
        }
        DowntimeAction::Close { .. } => tracing::info!("{}: downtime closed", target.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Store, TargetSeed};
    use crate::notify::testing::RecordingSink;
    use crate::notify::{AlertKind, TtlCache};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    const REFUSED: &str = "http://127.0.0.1:1";

    fn seeded_store(name: &str) -> Arc<Store> {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_target(
                "main",
                &TargetSeed {
                    name: name.to_string(),
                    url: REFUSED.to_string(),
                },
            )
            .unwrap();
        Arc::new(store)
    }

    fn monitor<R: StatusRepository>(repo: Arc<R>) -> Monitor<R, Arc<RecordingSink>> {
        Monitor::new(
            repo,
            reqwest::Client::new(),
            Deduper::new(
                Arc::new(TtlCache::new(Duration::from_secs(60))),
                Arc::new(RecordingSink::default()),
            ),
            RetryPolicy::new(3, Duration::from_millis(1)),
            Duration::from_secs(5),
        )
    }

    /// Delegates to a store but fails the first `busy_for` writes with SQLITE_BUSY.
    struct ContendedRepo {
        inner: Arc<Store>,
        busy_for: u32,
        attempts: AtomicU32,
    }

    impl StatusRepository for ContendedRepo {
        fn find_target(&self, name: &str) -> Result<Option<Target>, DbError> {
            self.inner.find_target(name)
        }

        fn get_targets(&self) -> Result<Vec<Target>, DbError> {
            self.inner.get_targets()
        }

        fn record_check(
            &self,
            target_id: i64,
            state: HealthState,
            code: u16,
            at: DateTime<Utc>,
        ) -> Result<DowntimeAction, DbError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.busy_for {
                let busy = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY);
                return Err(DbError::Sqlite(rusqlite::Error::SqliteFailure(busy, None)));
            }
            self.inner.record_check(target_id, state, code, at)
        }

        fn current_status(&self, target_id: i64) -> Result<Option<crate::db::CurrentStatus>, DbError> {
            self.inner.current_status(target_id)
        }

        fn list_by_server(&self) -> Result<BTreeMap<String, Vec<crate::db::TargetStatus>>, DbError> {
            self.inner.list_by_server()
        }
    }

    #[tokio::test]
    async fn test_unreachable_target_is_down() {
        let store = seeded_store("Foo");
        let monitor = monitor(store.clone());

        let resp = monitor
            .check(&CheckRequest::new("Foo", "http://example.invalid"))
            .await
            .unwrap();
        assert_eq!(resp.status, HealthState::Down);
        assert!(resp.response_ms > 0);
        assert_eq!(resp.checked_at.len(), 19);

        let target = store.find_target("Foo").unwrap().unwrap();
        let downtimes = store.downtimes_for(target.id).unwrap();
        assert_eq!(downtimes.len(), 1);
        assert!(downtimes[0].is_open());
        assert_eq!(downtimes[0].state, HealthState::Down);

        let current = store.current_status(target.id).unwrap().unwrap();
        assert_eq!(current.status_code, Some(0));
    }

    #[tokio::test]
    async fn test_repeated_failures_alert_once() {
        let store = seeded_store("Foo");
        let monitor = monitor(store.clone());

        for _ in 0..3 {
            monitor.check(&CheckRequest::new("Foo", REFUSED)).await.unwrap();
        }

        let target = store.find_target("Foo").unwrap().unwrap();
        assert_eq!(store.history_for(target.id, 10).unwrap().len(), 3);
        assert_eq!(store.downtimes_for(target.id).unwrap().len(), 1);
        assert_eq!(monitor.deduper.sink_ref().kinds(), vec![AlertKind::Failure]);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let monitor = monitor(seeded_store("Foo"));

        let missing_name = CheckRequest {
            name: None,
            url: Some(REFUSED.to_string()),
        };
        assert!(matches!(monitor.check(&missing_name).await, Err(MonitorError::Validation("name"))));

        let blank_url = CheckRequest::new("Foo", "   ");
        assert!(matches!(monitor.check(&blank_url).await, Err(MonitorError::Validation("url"))));
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let store = seeded_store("Foo");
        let monitor = monitor(store.clone());

        let err = monitor.check(&CheckRequest::new("Bar", REFUSED)).await.unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(ref n) if n == "Bar"));
        assert!(store.list_by_server().unwrap()["main"][0].status.is_none());
    }

    #[tokio::test]
    async fn test_contention_is_retried() {
        let store = seeded_store("Foo");
        let repo = Arc::new(ContendedRepo {
            inner: store.clone(),
            busy_for: 2,
            attempts: AtomicU32::new(0),
        });
        let monitor = monitor(repo.clone());

        let resp = monitor.check(&CheckRequest::new("Foo", REFUSED)).await.unwrap();
        assert_eq!(resp.status, HealthState::Down);
        assert_eq!(repo.attempts.load(Ordering::SeqCst), 3);

        let target = store.find_target("Foo").unwrap().unwrap();
        assert_eq!(store.history_for(target.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_contention_exhausted() {
        let store = seeded_store("Foo");
        let repo = Arc::new(ContendedRepo {
            inner: store.clone(),
            busy_for: u32::MAX,
            attempts: AtomicU32::new(0),
        });
        let monitor = monitor(repo.clone());

        let err = monitor.check(&CheckRequest::new("Foo", REFUSED)).await.unwrap_err();
        assert!(matches!(err, MonitorError::TransientStorage { attempts: 3 }));

        let target = store.find_target("Foo").unwrap().unwrap();
        assert!(store.current_status(target.id).unwrap().is_none());
        assert!(store.history_for(target.id, 10).unwrap().is_empty());
        assert!(store.downtimes_for(target.id).unwrap().is_empty());
        // No alert for a check that was not recorded.
        assert!(monitor.deduper.sink_ref().kinds().is_empty());
    }
}
