//! Downtime interval state machine.
//!
//! A target is either clear (no open interval) or degraded (exactly one open
//! interval tagged `DOWN` or `FORBIDDEN`). Boundaries only move when the kind
//! of health changes, never on every poll.

use chrono::{DateTime, Utc};

use super::models::{DowntimeInterval, HealthState};

/// What to do with the downtime table after a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DowntimeAction {
    /// Nothing changes.
    None,
    /// Open a new interval.
    Open { state: HealthState, started_at: DateTime<Utc> },
    /// Change the tag of the open interval in place; its start is kept.
    Retag { id: i64, state: HealthState },
    /// Close the open interval.
    Close { id: i64, ended_at: DateTime<Utc> },
}

/// Decide the transition for a new classified state `state` observed at `at`.
pub fn transition(open: Option<&DowntimeInterval>, state: HealthState, at: DateTime<Utc>) -> DowntimeAction {
    match (open, state) {
        (None, HealthState::Up) => DowntimeAction::None,
        (None, failing) => DowntimeAction::Open { state: failing, started_at: at },
        (Some(interval), HealthState::Up) => DowntimeAction::Close { id: interval.id, ended_at: at },
        (Some(interval), failing) if interval.state == failing => DowntimeAction::None,
        (Some(interval), failing) => DowntimeAction::Retag { id: interval.id, state: failing },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_interval(state: HealthState) -> DowntimeInterval {
        DowntimeInterval {
            id: 7,
            target_id: 1,
            state,
            started_at: Utc::now() - Duration::minutes(5),
            ended_at: None,
        }
    }

    #[test]
    fn test_clear_up_is_noop() {
        assert_eq!(transition(None, HealthState::Up, Utc::now()), DowntimeAction::None);
    }

    #[test]
    fn test_clear_failure_opens() {
        let now = Utc::now();
        for state in [HealthState::Down, HealthState::Forbidden] {
            assert_eq!(
                transition(None, state, now),
                DowntimeAction::Open { state, started_at: now }
            );
        }
    }

    #[test]
    fn test_degraded_up_closes() {
        let now = Utc::now();
        let open = open_interval(HealthState::Forbidden);
        assert_eq!(
            transition(Some(&open), HealthState::Up, now),
            DowntimeAction::Close { id: 7, ended_at: now }
        );
    }

    #[test]
    fn test_degraded_same_tag_continues() {
        let open = open_interval(HealthState::Down);
        assert_eq!(transition(Some(&open), HealthState::Down, Utc::now()), DowntimeAction::None);
    }

    #[test]
    fn test_degraded_other_tag_retags() {
        let open = open_interval(HealthState::Down);
        assert_eq!(
            transition(Some(&open), HealthState::Forbidden, Utc::now()),
            DowntimeAction::Retag { id: 7, state: HealthState::Forbidden }
        );
    }
}
