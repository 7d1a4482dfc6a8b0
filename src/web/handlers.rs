//! HTTP request handlers.

use super::AppState;
use crate::aggregate::DEFAULT_WINDOW_DAYS;
use crate::db::{DbError, DowntimeInterval, HealthState, StatusHistoryEntry, StatusRepository, TargetStatus};
use crate::monitor::{format_local, CheckRequest, MonitorError};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 1000;

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn internal(e: DbError) -> Response {
    tracing::error!("Storage error: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitorError::Validation(_) => StatusCode::BAD_REQUEST,
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::TransientStorage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::Storage(e) => {
                tracing::error!("Storage error during check: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TargetStatusView {
    pub name: String,
    pub url: String,
    pub status: Option<HealthState>,
    pub checked_at: Option<String>,
}

impl From<TargetStatus> for TargetStatusView {
    fn from(t: TargetStatus) -> Self {
        Self {
            name: t.name,
            url: t.url,
            status: t.status,
            checked_at: t.checked_at.map(format_local),
        }
    }
}

pub async fn handle_systems_list(State(state): State<AppState>) -> Response {
    match state.store.list_by_server() {
        Ok(listing) => {
            let view: BTreeMap<String, Vec<TargetStatusView>> = listing
                .into_iter()
                .map(|(server, targets)| (server, targets.into_iter().map(Into::into).collect()))
                .collect();
            Json(view).into_response()
        }
        Err(e) => internal(e),
    }
}

pub async fn handle_system_status(
    State(state): State<AppState>,
    Query(req): Query<CheckRequest>,
) -> Response {
    match state.monitor.check(&req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub name: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntryView {
    pub status: HealthState,
    pub status_code: Option<u16>,
    pub checked_at: String,
}

impl From<StatusHistoryEntry> for HistoryEntryView {
    fn from(e: StatusHistoryEntry) -> Self {
        Self {
            status: e.state,
            status_code: e.status_code,
            checked_at: format_local(e.checked_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DowntimeView {
    pub status: HealthState,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_minutes: f64,
}

impl DowntimeView {
    fn new(d: &DowntimeInterval, now: chrono::DateTime<Utc>) -> Self {
        Self {
            status: d.state,
            started_at: format_local(d.started_at),
            ended_at: d.ended_at.map(format_local),
            duration_minutes: (d.duration(now).num_milliseconds() as f64 / 600.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub name: String,
    pub url: String,
    pub current: Option<HistoryEntryView>,
    pub history: Vec<HistoryEntryView>,
    pub downtimes: Vec<DowntimeView>,
}

pub async fn handle_system_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(name) = query.name.filter(|n| !n.trim().is_empty()) else {
        return MonitorError::Validation("name").into_response();
    };

    let target = match state.store.find_target(&name) {
        Ok(Some(t)) => t,
        Ok(None) => return MonitorError::NotFound(name).into_response(),
        Err(e) => return internal(e),
    };

    let current = match state.store.current_status(target.id) {
        Ok(c) => c.map(|c| HistoryEntryView {
            status: c.state,
            status_code: c.status_code,
            checked_at: format_local(c.checked_at),
        }),
        Err(e) => return internal(e),
    };

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
    let history = match state.store.history_for(target.id, limit) {
        Ok(h) => h,
        Err(e) => return internal(e),
    };
    let downtimes = match state.store.downtimes_for(target.id) {
        Ok(d) => d,
        Err(e) => return internal(e),
    };

    let now = Utc::now();
    Json(HistoryResponse {
        name: target.name,
        url: target.url,
        current,
        history: history.into_iter().map(Into::into).collect(),
        downtimes: downtimes.iter().map(|d| DowntimeView::new(d, now)).collect(),
    })
    .into_response()
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<u32>,
}

pub async fn handle_dashboard_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    match state.aggregator.summary(days, Utc::now()) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal(e),
    }
}

pub async fn handle_uptime_by_hour(State(state): State<AppState>) -> Response {
    match state.aggregator.hourly_uptime(Utc::now(), &Local) {
        Ok(uptime) => Json(uptime).into_response(),
        Err(e) => internal(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (MonitorError::Validation("name"), StatusCode::BAD_REQUEST),
            (MonitorError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (MonitorError::TransientStorage { attempts: 3 }, StatusCode::SERVICE_UNAVAILABLE),
            (MonitorError::Storage(DbError::Poisoned), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_target_view_serialization() {
        let view: TargetStatusView = TargetStatus {
            name: "a".to_string(),
            url: "http://a".to_string(),
            status: None,
            checked_at: None,
        }
        .into();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "a", "url": "http://a", "status": null, "checked_at": null})
        );
    }

    #[test]
    fn test_downtime_view_minutes() {
        let now = Utc::now();
        let d = DowntimeInterval {
            id: 1,
            target_id: 1,
            state: HealthState::Down,
            started_at: now - ChronoDuration::seconds(90),
            ended_at: None,
        };
        let view = DowntimeView::new(&d, now);
        assert_eq!(view.duration_minutes, 1.5);
        assert!(view.ended_at.is_none());
    }
}
