//! Dashboard aggregates: status counts, downtime ranking, hourly uptime.
//!
//! Read-only; every query is computed on demand from the store.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{DbError, DowntimeInterval, HealthState, MetricsSource, StatusHistoryEntry};

/// Default ranking window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;
/// Number of targets in the downtime ranking.
pub const RANKING_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub up: usize,
    pub forbidden: usize,
    /// `DOWN` plus targets that were never checked.
    pub other: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimeRank {
    pub name: String,
    pub total_minutes: f64,
}

/// Parallel hour labels (`"00h"`..`"23h"`) and uptime percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyUptime {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub counts: StatusCounts,
    pub downtime_ranking: Vec<DowntimeRank>,
    pub window_days: u32,
}

pub fn count_states(states: &[Option<HealthState>]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for state in states {
        match state {
            Some(HealthState::Up) => counts.up += 1,
            Some(HealthState::Forbidden) => counts.forbidden += 1,
            _ => counts.other += 1,
        }
    }
    counts
}

/// Whether an interval started or ended at/after `since`, or is still open.
fn overlaps(interval: &DowntimeInterval, since: DateTime<Utc>) -> bool {
    interval.is_open() || interval.started_at >= since || interval.ended_at.is_some_and(|end| end >= since)
}

/// Sum full interval durations per target and return the largest totals.
///
/// Open intervals count up to `now`. Ties are ordered by name.
pub fn rank_downtimes(
    intervals: &[(String, DowntimeInterval)],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<DowntimeRank> {
    let mut totals: HashMap<&str, ChronoDuration> = HashMap::new();
    for (name, interval) in intervals.iter().filter(|(_, i)| overlaps(i, since)) {
        *totals.entry(name.as_str()).or_insert_with(ChronoDuration::zero) += interval.duration(now);
    }

    let mut ranked: Vec<(&str, ChronoDuration)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);

    ranked
        .into_iter()
        .map(|(name, total)| DowntimeRank {
            name: name.to_string(),
            total_minutes: round2(total.num_milliseconds() as f64 / 60_000.0),
        })
        .collect()
}

/// Bucket entries by hour of day in `tz` and compute the share of `UP`.
///
/// Entries from different days that share an hour of day land in the same
/// bucket. Empty buckets report 0.
pub fn hourly_uptime<Tz: TimeZone>(entries: &[StatusHistoryEntry], tz: &Tz) -> HourlyUptime {
    let mut totals = [0u32; 24];
    let mut ups = [0u32; 24];
    for entry in entries {
        let hour = entry.checked_at.with_timezone(tz).hour() as usize;
        totals[hour] += 1;
        if entry.state == HealthState::Up {
            ups[hour] += 1;
        }
    }

    let labels = (0..24).map(|h| format!("{:02}h", h)).collect();
    let values = totals
        .iter()
        .zip(ups.iter())
        .map(|(&total, &up)| {
            if total == 0 {
                0.0
            } else {
                round2(100.0 * up as f64 / total as f64)
            }
        })
        .collect();

    HourlyUptime { labels, values }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Computes aggregates over a metrics source.
pub struct Aggregator<M> {
    source: Arc<M>,
}

impl<M: MetricsSource> Aggregator<M> {
    pub fn new(source: Arc<M>) -> Self {
        Self { source }
    }

    pub fn status_counts(&self) -> Result<StatusCounts, DbError> {
        Ok(count_states(&self.source.latest_states()?))
    }

    /// Top targets by downtime in the `days` ending at `now`.
    pub fn downtime_ranking(&self, days: u32, now: DateTime<Utc>) -> Result<Vec<DowntimeRank>, DbError> {
        // Windows reaching past the representable range cover all of history.
        let since = now
            .checked_sub_signed(ChronoDuration::days(days as i64))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let intervals = self.source.downtimes_overlapping(since)?;
        Ok(rank_downtimes(&intervals, since, now, RANKING_LIMIT))
    }

    /// Uptime per hour of day over the 24 hours ending at `now`.
    pub fn hourly_uptime<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> Result<HourlyUptime, DbError> {
        let entries = self.source.history_since(now - ChronoDuration::hours(24))?;
        Ok(hourly_uptime(&entries, tz))
    }

    pub fn summary(&self, days: u32, now: DateTime<Utc>) -> Result<DashboardSummary, DbError> {
        Ok(DashboardSummary {
            counts: self.status_counts()?,
            downtime_ranking: self.downtime_ranking(days, now)?,
            window_days: days,
        })
    }
}
