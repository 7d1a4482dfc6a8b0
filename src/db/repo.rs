//! Storage seams used by the check engine and the aggregator.
//!
//! `Store` implements both against SQLite; tests can substitute their own.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::downtime::DowntimeAction;
use super::models::*;
use super::store::DbError;

/// Status store and downtime tracker operations used by a check.
pub trait StatusRepository: Send + Sync {
    /// Look up a target by its unique name.
    fn find_target(&self, name: &str) -> Result<Option<Target>, DbError>;

    /// All known targets.
    fn get_targets(&self) -> Result<Vec<Target>, DbError>;

    /// Upsert the current status, append a history entry and apply the
    /// downtime transition, all in one transaction.
    fn record_check(
        &self,
        target_id: i64,
        state: HealthState,
        code: u16,
        at: DateTime<Utc>,
    ) -> Result<DowntimeAction, DbError>;

    /// `None` when the target has never been checked.
    fn current_status(&self, target_id: i64) -> Result<Option<CurrentStatus>, DbError>;

    /// Server name to its targets (ordered by name) with their latest status.
    fn list_by_server(&self) -> Result<BTreeMap<String, Vec<TargetStatus>>, DbError>;
}

/// Read-only queries backing the dashboard aggregates.
pub trait MetricsSource: Send + Sync {
    /// One entry per target; `None` for targets never checked.
    fn latest_states(&self) -> Result<Vec<Option<HealthState>>, DbError>;

    /// Intervals that started or ended at/after `since`, or are still open,
    /// paired with their target's name.
    fn downtimes_overlapping(&self, since: DateTime<Utc>) -> Result<Vec<(String, DowntimeInterval)>, DbError>;

    /// History entries checked at/after `since`.
    fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<StatusHistoryEntry>, DbError>;
}
