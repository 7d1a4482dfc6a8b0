//! Outbound alert delivery.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::Alert;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Alert delivery failures. Always logged and swallowed by the caller.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

/// Destination for alerts.
pub trait AlertSink: Send + Sync {
    fn send(&self, alert: &Alert) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Posts `{"content": "..."}` to a configured webhook URL.
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookSink {
    /// A sink with no URL drops every alert.
    pub fn new(client: reqwest::Client, url: Option<String>) -> Self {
        Self { client, url }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

impl AlertSink for WebhookSink {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let Some(url) = &self.url else {
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&serde_json::json!({ "content": alert.content() }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::HealthState;
    use crate::notify::AlertKind;
    use axum::{http::Method, http::StatusCode, routing::any, Json, Router};
    use chrono::Utc;
    use tokio::sync::mpsc;

    /// Serve a hook on an ephemeral port that answers `status` and forwards
    /// each request's method and JSON body.
    async fn capture_hook(status: StatusCode) -> (String, mpsc::UnboundedReceiver<(Method, serde_json::Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Router::new().route(
            "/hook",
            any(move |method: Method, Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((method, body));
                    status
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}/hook", addr), rx)
    }

    fn alert() -> Alert {
        Alert {
            kind: AlertKind::Failure,
            target: "foo".to_string(),
            url: "http://foo".to_string(),
            state: HealthState::Down,
            code: 0,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_disabled_sink_is_noop() {
        let sink = WebhookSink::new(reqwest::Client::new(), None);
        assert!(!sink.is_enabled());
        assert!(sink.send(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_posts_alert_content_as_json() {
        let (url, mut rx) = capture_hook(StatusCode::NO_CONTENT).await;
        let sink = WebhookSink::new(reqwest::Client::new(), Some(url));
        let alert = alert();

        sink.send(&alert).await.unwrap();

        let (method, body) = rx.recv().await.unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(body, serde_json::json!({ "content": alert.content() }));
        assert!(body["content"].as_str().unwrap().starts_with("[ALERT] foo is DOWN"));
    }

    #[tokio::test]
    async fn test_non_success_reply_is_status_error() {
        let (url, mut rx) = capture_hook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let sink = WebhookSink::new(reqwest::Client::new(), Some(url));

        let result = sink.send(&alert()).await;
        assert!(matches!(result, Err(NotifyError::Status(500))));
        // The request still reached the hook.
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_reports_error() {
        let sink = WebhookSink::new(reqwest::Client::new(), Some("http://127.0.0.1:1/hook".to_string()));
        assert!(matches!(sink.send(&alert()).await, Err(NotifyError::Transport(_))));
    }
}
