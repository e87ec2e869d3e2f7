//! SQLite store implementation.
//!
//! All writes are durable before return. Incident records are keyed by
//! incident id; writing an existing id atomically replaces the row, which
//! is how a resolved record supersedes its open record.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;
use crate::metrics::MetricSnapshot;

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Persistence error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Thread-safe persistence sink.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("init migration failed: {}", e)))?;
        Ok(())
    }

    // --- Incidents ---

    /// Write an incident record, replacing any previous record with the
    /// same id.
    pub fn write_incident(&self, incident: &Incident) -> Result<(), DbError> {
        let details = serde_json::to_string(&incident.details)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO incidents (id, target, start_time, end_time, duration_seconds, status, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
             end_time=excluded.end_time, duration_seconds=excluded.duration_seconds,
             status=excluded.status, details=excluded.details",
            params![
                incident.id,
                incident.target,
                incident.start_time.format(DB_TIME_FORMAT).to_string(),
                incident
                    .end_time
                    .map(|t| t.format(DB_TIME_FORMAT).to_string()),
                incident.duration_seconds,
                incident.status.as_str(),
                details,
            ],
        )?;
        Ok(())
    }

    /// Read all incident records, active and resolved.
    pub fn get_incidents(&self) -> Result<Vec<Incident>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target, start_time, end_time, duration_seconds, status, details
             FROM incidents",
        )?;
        let incidents = stmt
            .query_map([], row_to_incident)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(incidents)
    }

    /// Read the most recent incidents, ordered by start time descending.
    pub fn get_incident_history(&self, limit: usize) -> Result<Vec<Incident>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target, start_time, end_time, duration_seconds, status, details
             FROM incidents ORDER BY start_time DESC LIMIT ?1",
        )?;
        let incidents = stmt
            .query_map(params![limit as i64], row_to_incident)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(incidents)
    }

    /// Read incidents currently marked active.
    pub fn get_active_incidents(&self) -> Result<Vec<Incident>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target, start_time, end_time, duration_seconds, status, details
             FROM incidents WHERE status = 'active'",
        )?;
        let incidents = stmt
            .query_map([], row_to_incident)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(incidents)
    }

    // --- Metric snapshots ---

    /// Append a raw metric snapshot.
    pub fn add_metric_snapshot(&self, snapshot: &MetricSnapshot) -> Result<(), DbError> {
        let data = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metric_snapshots (time, data) VALUES (?1, ?2)",
            params![snapshot.timestamp.format(DB_TIME_FORMAT).to_string(), data],
        )?;
        Ok(())
    }

    /// Read the most recent metric snapshots, newest first.
    pub fn get_metric_snapshots(&self, limit: usize) -> Result<Vec<MetricSnapshot>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT data FROM metric_snapshots ORDER BY time DESC LIMIT ?1")?;
        let snapshots = stmt
            .query_map(params![limit as i64], |row| {
                let data: String = row.get(0)?;
                serde_json::from_str(&data).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(snapshots)
    }

    /// Delete metric snapshots older than the cutoff.
    pub fn delete_metric_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM metric_snapshots WHERE time < ?1",
            params![cutoff.format(DB_TIME_FORMAT).to_string()],
        )?;
        Ok(())
    }
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> SqlResult<Incident> {
    let start_str: String = row.get(2)?;
    let end_str: Option<String> = row.get(3)?;
    let status_str: String = row.get(5)?;
    let details_str: String = row.get(6)?;

    let details = serde_json::from_str(&details_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Incident {
        id: row.get(0)?,
        target: row.get(1)?,
        start_time: parse_db_time(&start_str).unwrap_or_else(Utc::now),
        end_time: end_str.as_deref().and_then(parse_db_time),
        duration_seconds: row.get(4)?,
        status: IncidentStatus::parse(&status_str).unwrap_or(IncidentStatus::Resolved),
        details,
    })
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
