//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row, TransactionBehavior,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::downtime::{transition, DowntimeAction};
use super::models::*;
use super::repo::{MetricsSource, StatusRepository};
use crate::retry::Transient;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Seed file error: {0}")]
    Seed(String),
    #[error("Connection mutex poisoned")]
    Poisoned,
}

impl Transient for DbError {
    fn is_transient(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::init(Connection::open(path)?)
    }

    /// Create a store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Configure the connection and apply migrations.
    fn init(mut conn: Connection) -> Result<Self, DbError> {
        // Contention is surfaced immediately and handled by the caller's retry policy.
        conn.busy_timeout(Duration::ZERO)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Servers and targets ---

    /// Add a server if missing and return its ID.
    pub fn add_server(&self, name: &str) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO servers (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        let id: i64 = conn.query_row("SELECT id FROM servers WHERE name = ?1", params![name], |row| row.get(0))?;
        Ok(id)
    }

    /// Insert a target under `server_name`, or update the URL and owner of an
    /// existing target with the same name.
    pub fn upsert_target(&self, server_name: &str, seed: &TargetSeed) -> Result<Target, DbError> {
        let server_id = self.add_server(server_name)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO targets (name, url, server_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET url=excluded.url, server_id=excluded.server_id",
            params![seed.name, seed.url, server_id],
        )?;
        let target = conn.query_row(
            "SELECT id, name, url, server_id FROM targets WHERE name = ?1",
            params![seed.name],
            row_to_target,
        )?;
        Ok(target)
    }

    /// Load a `{server: [{name, url}]}` JSON file and upsert every entry.
    ///
    /// Returns the number of targets seeded.
    pub fn seed_from_file<P: AsRef<Path>>(&self, path: P) -> Result<usize, DbError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DbError::Seed(format!("{}: {}", path.display(), e)))?;
        let servers: BTreeMap<String, Vec<TargetSeed>> =
            serde_json::from_str(&raw).map_err(|e| DbError::Seed(format!("{}: {}", path.display(), e)))?;

        let mut count = 0;
        for (server, targets) in &servers {
            self.add_server(server)?;
            for seed in targets {
                self.upsert_target(server, seed)?;
                count += 1;
            }
        }
        Ok(count)
    }

    // --- History and downtimes ---

    /// Most recent history entries for a target, newest first.
    pub fn history_for(&self, target_id: i64, limit: u32) -> Result<Vec<StatusHistoryEntry>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, state, status_code, checked_at FROM status_history
             WHERE target_id = ?1 ORDER BY checked_at DESC, id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![target_id, limit], row_to_history)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// All downtime intervals for a target, newest first.
    pub fn downtimes_for(&self, target_id: i64) -> Result<Vec<DowntimeInterval>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, state, started_at, ended_at FROM downtimes
             WHERE target_id = ?1 ORDER BY started_at DESC, id DESC",
        )?;
        let intervals = stmt
            .query_map(params![target_id], row_to_downtime)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(intervals)
    }
}

impl StatusRepository for Store {
    fn find_target(&self, name: &str) -> Result<Option<Target>, DbError> {
        let conn = self.conn()?;
        let target = conn
            .query_row(
                "SELECT id, name, url, server_id FROM targets WHERE name = ?1",
                params![name],
                row_to_target,
            )
            .optional()?;
        Ok(target)
    }

    fn get_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, url, server_id FROM targets ORDER BY name")?;
        let targets = stmt
            .query_map([], row_to_target)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(targets)
    }

    fn record_check(
        &self,
        target_id: i64,
        state: HealthState,
        code: u16,
        at: DateTime<Utc>,
    ) -> Result<DowntimeAction, DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let at_str = format_db_time(at);

        tx.execute(
            "INSERT INTO current_status (target_id, state, status_code, checked_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(target_id) DO UPDATE SET
             state=excluded.state, status_code=excluded.status_code, checked_at=excluded.checked_at",
            params![target_id, state.as_str(), code, at_str],
        )?;
        tx.execute(
            "INSERT INTO status_history (target_id, state, status_code, checked_at) VALUES (?1, ?2, ?3, ?4)",
            params![target_id, state.as_str(), code, at_str],
        )?;

        let open = tx
            .query_row(
                "SELECT id, target_id, state, started_at, ended_at FROM downtimes
                 WHERE target_id = ?1 AND ended_at IS NULL",
                params![target_id],
                row_to_downtime,
            )
            .optional()?;

        let action = transition(open.as_ref(), state, at);
        match &action {
            DowntimeAction::None => {}
            DowntimeAction::Open { state, started_at } => {
                tx.execute(
                    "INSERT INTO downtimes (target_id, state, started_at) VALUES (?1, ?2, ?3)",
                    params![target_id, state.as_str(), format_db_time(*started_at)],
                )?;
            }
            DowntimeAction::Retag { id, state } => {
                tx.execute(
                    "UPDATE downtimes SET state = ?1 WHERE id = ?2",
                    params![state.as_str(), id],
                )?;
            }
            DowntimeAction::Close { id, ended_at } => {
                tx.execute(
                    "UPDATE downtimes SET ended_at = ?1 WHERE id = ?2",
                    params![format_db_time(*ended_at), id],
                )?;
            }
        }

        tx.commit()?;
        Ok(action)
    }

    fn current_status(&self, target_id: i64) -> Result<Option<CurrentStatus>, DbError> {
        let conn = self.conn()?;
        let status = conn
            .query_row(
                "SELECT target_id, state, status_code, checked_at FROM current_status WHERE target_id = ?1",
                params![target_id],
                |row| {
                    Ok(CurrentStatus {
                        target_id: row.get(0)?,
                        state: state_at(row, 1)?,
                        status_code: row.get(2)?,
                        checked_at: time_at(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(status)
    }

    fn list_by_server(&self) -> Result<BTreeMap<String, Vec<TargetStatus>>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.name, t.name, t.url, cs.state, cs.checked_at
             FROM servers s
             LEFT JOIN targets t ON t.server_id = s.id
             LEFT JOIN current_status cs ON cs.target_id = t.id
             ORDER BY s.name, t.name",
        )?;

        let mut rows = stmt.query([])?;
        let mut listing: BTreeMap<String, Vec<TargetStatus>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let server: String = row.get(0)?;
            let entry = listing.entry(server).or_default();

            let name: Option<String> = row.get(1)?;
            let Some(name) = name else { continue };
            let status: Option<String> = row.get(3)?;
            entry.push(TargetStatus {
                name,
                url: row.get(2)?,
                status: status.map(|s| parse_state(3, &s)).transpose()?,
                checked_at: opt_time_at(row, 4)?,
            });
        }
        Ok(listing)
    }
}

impl MetricsSource for Store {
    fn latest_states(&self) -> Result<Vec<Option<HealthState>>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT cs.state FROM targets t LEFT JOIN current_status cs ON cs.target_id = t.id",
        )?;
        let states = stmt
            .query_map([], |row| {
                let s: Option<String> = row.get(0)?;
                s.map(|s| parse_state(0, &s)).transpose()
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(states)
    }

    fn downtimes_overlapping(&self, since: DateTime<Utc>) -> Result<Vec<(String, DowntimeInterval)>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.name, d.id, d.target_id, d.state, d.started_at, d.ended_at
             FROM downtimes d JOIN targets t ON t.id = d.target_id
             WHERE d.started_at >= ?1 OR d.ended_at >= ?1 OR d.ended_at IS NULL",
        )?;
        let since = format_db_time(since);
        let intervals = stmt
            .query_map(params![since], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    DowntimeInterval {
                        id: row.get(1)?,
                        target_id: row.get(2)?,
                        state: state_at(row, 3)?,
                        started_at: time_at(row, 4)?,
                        ended_at: opt_time_at(row, 5)?,
                    },
                ))
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(intervals)
    }

    fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<StatusHistoryEntry>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, state, status_code, checked_at FROM status_history
             WHERE checked_at >= ?1 ORDER BY checked_at DESC, id DESC",
        )?;
        let entries = stmt
            .query_map(params![format_db_time(since)], row_to_history)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(entries)
    }
}

fn row_to_target(row: &Row<'_>) -> SqlResult<Target> {
    Ok(Target {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        server_id: row.get(3)?,
    })
}

fn row_to_history(row: &Row<'_>) -> SqlResult<StatusHistoryEntry> {
    Ok(StatusHistoryEntry {
        id: row.get(0)?,
        target_id: row.get(1)?,
        state: state_at(row, 2)?,
        status_code: row.get(3)?,
        checked_at: time_at(row, 4)?,
    })
}

fn row_to_downtime(row: &Row<'_>) -> SqlResult<DowntimeInterval> {
    Ok(DowntimeInterval {
        id: row.get(0)?,
        target_id: row.get(1)?,
        state: state_at(row, 2)?,
        started_at: time_at(row, 3)?,
        ended_at: opt_time_at(row, 4)?,
    })
}

fn parse_state(idx: usize, s: &str) -> SqlResult<HealthState> {
    s.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn state_at(row: &Row<'_>, idx: usize) -> SqlResult<HealthState> {
    let s: String = row.get(idx)?;
    parse_state(idx, &s)
}

fn time_at(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("bad timestamp: {}", s).into())
    })
}

fn opt_time_at(row: &Row<'_>, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => parse_db_time(&s).map(Some).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("bad timestamp: {}", s).into())
        }),
        None => Ok(None),
    }
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [DB_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
