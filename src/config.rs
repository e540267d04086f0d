//! Configuration module for the uptime probe.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port for the invocation server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "uptime.db")
    pub db_path: String,
    /// Probe timeout in seconds (default: 4)
    pub timeout_secs: u64,
    /// Consecutive failures tolerated before alerting (default: 3)
    pub fail_threshold: u32,
    /// Table holding failure counters (default: "uptime_status")
    pub status_table: String,
    /// Table holding raw results. Persistence is skipped when unset.
    pub results_table: Option<String>,
    /// Topic URL for status notifications. Publishing is skipped when unset.
    pub topic_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "uptime.db".to_string(),
            timeout_secs: 4,
            fail_threshold: 3,
            status_table: "uptime_status".to_string(),
            results_table: None,
            topic_url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTIME_HTTP_PORT`: HTTP port (default: 8080)
    /// - `UPTIME_DB_PATH`: Database file path (default: "uptime.db")
    /// - `TIMEOUT`: Probe timeout in seconds (default: 4)
    /// - `FAIL_THRESHOLD`: Tolerated consecutive failures (default: 3)
    /// - `UPTIME_STATUS_TABLE`: Failure counter table (default: "uptime_status")
    /// - `UPTIME_RESULTS_TABLE`: Raw result table (optional)
    /// - `UPTIME_TOPIC_URL`: Notification topic URL (optional)
    pub fn load() -> Self {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = lookup("UPTIME_HTTP_PORT").and_then(|v| v.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("UPTIME_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(timeout) = lookup("TIMEOUT")
            .and_then(|v| v.parse().ok())
            .filter(|t: &u64| *t > 0)
        {
            cfg.timeout_secs = timeout;
        }

        if let Some(threshold) = lookup("FAIL_THRESHOLD").and_then(|v| v.parse().ok()) {
            cfg.fail_threshold = threshold;
        }

        if let Some(table) = lookup("UPTIME_STATUS_TABLE") {
            cfg.status_table = table;
        }

        cfg.results_table = lookup("UPTIME_RESULTS_TABLE").filter(|v| !v.is_empty());
        cfg.topic_url = lookup("UPTIME_TOPIC_URL").filter(|v| !v.is_empty());

        cfg
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
