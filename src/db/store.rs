//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),
    #[error("raw result persistence is not configured")]
    ResultsDisabled,
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Write side of the raw result audit log.
pub trait ResultStore: Send + Sync {
    fn put(&self, record: &RawResultRecord) -> Result<(), DbError>;
}

/// Persistent failure counters, one row per target.
pub trait CounterStore: Send + Sync {
    /// Increment the counter (starting from zero) and overwrite the threshold
    /// in a single atomic update. Returns the updated row.
    fn increment_and_set_threshold(
        &self,
        target_id: &str,
        threshold: u32,
    ) -> Result<FailureCounterState, DbError>;

    /// Remove the counter row. Returns whether a row existed.
    fn delete_if_exists(&self, target_id: &str) -> Result<bool, DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    status_table: String,
    results_table: Option<String>,
}

impl Store {
    /// Open the store at `path`, creating the tables when missing.
    ///
    /// Raw results are only writable when `results_table` is given.
    pub fn open<P: AsRef<Path>>(
        path: P,
        status_table: &str,
        results_table: Option<&str>,
    ) -> Result<Self, DbError> {
        validate_table_name(status_table)?;
        if let Some(table) = results_table {
            validate_table_name(table)?;
        }

        let conn = Connection::open(path)?;
        // Other processes may hold the write lock on the same file.
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            status_table: status_table.to_string(),
            results_table: results_table.map(str::to_string),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {status} (
                target_id TEXT PRIMARY KEY,
                fail_counter INTEGER NOT NULL,
                threshold INTEGER NOT NULL
            );",
            status = self.status_table
        ))?;

        if let Some(results) = &self.results_table {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {results} (
                    run_id TEXT PRIMARY KEY,
                    target_id TEXT NOT NULL,
                    run_at TEXT NOT NULL,
                    host TEXT NOT NULL,
                    status_code INTEGER NOT NULL,
                    ttfb_ms INTEGER NOT NULL,
                    dns_lookup_ms INTEGER NOT NULL,
                    tls_handshake_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{results}_target_time
                    ON {results} (target_id, run_at);",
                results = results
            ))?;
        }

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    pub fn results_enabled(&self) -> bool {
        self.results_table.is_some()
    }

    // --- Raw Results ---

    /// Get the most recent raw results for a target, newest first.
    pub fn get_raw_results(&self, target_id: &str, limit: u32) -> Result<Vec<RawResultRecord>, DbError> {
        let table = self.results_table.as_deref().ok_or(DbError::ResultsDisabled)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT run_id, target_id, run_at, host, status_code, ttfb_ms, dns_lookup_ms, tls_handshake_ms
             FROM {} WHERE target_id = ?1 ORDER BY run_at DESC LIMIT ?2",
            table
        ))?;

        let results = stmt
            .query_map(params![target_id, limit], |row| {
                let time_str: String = row.get(2)?;
                let run_at = parse_db_time(&time_str).unwrap_or_else(Utc::now);
                Ok(RawResultRecord {
                    run_id: row.get(0)?,
                    target_id: row.get(1)?,
                    run_at,
                    host: row.get(3)?,
                    status_code: row.get(4)?,
                    ttfb_ms: row.get(5)?,
                    dns_lookup_ms: row.get(6)?,
                    tls_handshake_ms: row.get(7)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(results)
    }

    // --- Failure Counters ---

    /// Get the failure counter for a target, if it is in a failing streak.
    pub fn get_counter(&self, target_id: &str) -> Result<Option<FailureCounterState>, DbError> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                &format!(
                    "SELECT fail_counter, threshold FROM {} WHERE target_id = ?1",
                    self.status_table
                ),
                params![target_id],
                |row| {
                    Ok(FailureCounterState {
                        fail_counter: row.get(0)?,
                        threshold: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }
}

impl ResultStore for Store {
    fn put(&self, record: &RawResultRecord) -> Result<(), DbError> {
        let table = self.results_table.as_deref().ok_or(DbError::ResultsDisabled)?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (run_id, target_id, run_at, host, status_code, ttfb_ms, dns_lookup_ms, tls_handshake_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                table
            ),
            params![
                record.run_id,
                record.target_id,
                record.run_at.format(TIME_FORMAT).to_string(),
                record.host,
                record.status_code,
                record.ttfb_ms,
                record.dns_lookup_ms,
                record.tls_handshake_ms,
            ],
        )?;
        Ok(())
    }
}

impl CounterStore for Store {
    fn increment_and_set_threshold(
        &self,
        target_id: &str,
        threshold: u32,
    ) -> Result<FailureCounterState, DbError> {
        let conn = self.conn()?;
        // One statement, so concurrent writers on the same file both count.
        let state = conn.query_row(
            &format!(
                "INSERT INTO {} (target_id, fail_counter, threshold) VALUES (?1, 1, ?2)
                 ON CONFLICT(target_id) DO UPDATE SET
                 fail_counter = fail_counter + 1, threshold = excluded.threshold
                 RETURNING fail_counter, threshold",
                self.status_table
            ),
            params![target_id, threshold],
            |row| {
                Ok(FailureCounterState {
                    fail_counter: row.get(0)?,
                    threshold: row.get(1)?,
                })
            },
        )?;
        Ok(state)
    }

    fn delete_if_exists(&self, target_id: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE target_id = ?1", self.status_table),
            params![target_id],
        )?;
        Ok(deleted > 0)
    }
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
fn validate_table_name(name: &str) -> Result<(), DbError> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let ident = IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    });

    if ident.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidTableName(name.to_string()))
    }
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

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
