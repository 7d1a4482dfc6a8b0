//! Failure and recovery alerts, deduplicated per target.

mod cache;
mod webhook;

pub use cache::*;
pub use webhook::*;

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;

use crate::db::HealthState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Failure,
    Recovery,
}

/// An alert about one target.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub target: String,
    pub url: String,
    pub state: HealthState,
    pub code: u16,
    pub at: DateTime<Utc>,
}

impl Alert {
    /// Human-readable message body.
    pub fn content(&self) -> String {
        let checked_at = self.at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
        match self.kind {
            AlertKind::Failure => {
                let response = if self.code == 0 {
                    "no response".to_string()
                } else {
                    self.code.to_string()
                };
                format!(
                    "[ALERT] {} is {}\nURL: {}\nResponse: {}\nChecked at: {}",
                    self.target, self.state, self.url, response, checked_at
                )
            }
            AlertKind::Recovery => format!(
                "[RECOVERED] {} is UP again\nURL: {}\nChecked at: {}",
                self.target, self.url, checked_at
            ),
        }
    }
}

/// Whether moving from the last notified state to `new` warrants an alert.
///
/// A failure alert fires once per distinct failure state; a recovery alert
/// fires on the first `UP` after a notified failure.
pub fn decide(last: Option<HealthState>, new: HealthState) -> Option<AlertKind> {
    if new.is_failure() && last != Some(new) {
        Some(AlertKind::Failure)
    } else if last.is_some_and(HealthState::is_failure) && new == HealthState::Up {
        Some(AlertKind::Recovery)
    } else {
        None
    }
}

/// Remembers the last state per target and sends alerts on changes.
pub struct Deduper<S = WebhookSink> {
    cache: Arc<dyn StateCache>,
    sink: S,
}

impl<S: AlertSink> Deduper<S> {
    pub fn new(cache: Arc<dyn StateCache>, sink: S) -> Self {
        Self { cache, sink }
    }

    pub fn cache(&self) -> &Arc<dyn StateCache> {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn sink_ref(&self) -> &S {
        &self.sink
    }

    /// Record the new state for `target` and send an alert if one is due.
    ///
    /// Returns the kind of alert that was attempted. Delivery errors are
    /// logged and never propagated.
    pub async fn observe(
        &self,
        target: &str,
        url: &str,
        state: HealthState,
        code: u16,
        at: DateTime<Utc>,
    ) -> Option<AlertKind> {
        let last = self.cache.get(target);
        self.cache.set(target, state);

        let kind = decide(last, state)?;
        let alert = Alert {
            kind,
            target: target.to_string(),
            url: url.to_string(),
            state,
            code,
            at,
        };

        match self.sink.send(&alert).await {
            Ok(()) => tracing::info!("Sent {:?} alert for {} ({})", kind, target, state),
            Err(e) => tracing::warn!("Failed to deliver {:?} alert for {}: {}", kind, target, e),
        }
        Some(kind)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records alerts instead of delivering them.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<Alert>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn kinds(&self) -> Vec<AlertKind> {
            self.sent.lock().unwrap().iter().map(|a| a.kind).collect()
        }
    }

    impl AlertSink for RecordingSink {
        async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(alert.clone());
            if self.fail {
                Err(NotifyError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    impl AlertSink for Arc<RecordingSink> {
        async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
            (**self).send(alert).await
        }
    }
}
