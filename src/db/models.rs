//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Health of a target as derived from its last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Up,
    Forbidden,
    Down,
}

impl HealthState {
    /// Classify a raw response code. `0` means no response was received.
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => HealthState::Up,
            403 => HealthState::Forbidden,
            _ => HealthState::Down,
        }
    }

    /// `DOWN` and `FORBIDDEN` both count as failures.
    pub fn is_failure(self) -> bool {
        !matches!(self, HealthState::Up)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Up => "UP",
            HealthState::Forbidden => "FORBIDDEN",
            HealthState::Down => "DOWN",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(HealthState::Up),
            "FORBIDDEN" => Ok(HealthState::Forbidden),
            "DOWN" => Ok(HealthState::Down),
            other => Err(format!("unknown health state: {}", other)),
        }
    }
}

/// A monitored endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub server_id: i64,
}

/// Latest known status of a target. One row per checked target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentStatus {
    pub target_id: i64,
    pub state: HealthState,
    /// Raw response code; `None` only for rows written without a probe.
    pub status_code: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

/// One past check. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub target_id: i64,
    pub state: HealthState,
    pub status_code: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

/// A contiguous span during which a target was not `UP`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimeInterval {
    pub id: i64,
    pub target_id: i64,
    pub state: HealthState,
    pub started_at: DateTime<Utc>,
    /// `None` while the interval is still open.
    pub ended_at: Option<DateTime<Utc>>,
}

impl DowntimeInterval {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Duration up to the end timestamp, or up to `now` for an open interval.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }
}

/// A target row joined with its latest status, used for listings.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub name: String,
    pub url: String,
    pub status: Option<HealthState>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Target entry in a seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSeed {
    pub name: String,
    pub url: String,
}
