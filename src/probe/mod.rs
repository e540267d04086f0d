//! Probe module for uptime monitoring.
//!
//! Issues a single instrumented HTTP GET and reports the status code along
//! with DNS, TLS and time-to-first-byte durations.

mod http;

pub use self::http::*;

use std::time::Duration;
use thiserror::Error;

/// Probe error types. Every variant is a transport failure.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns lookup failed: {0}")]
    Dns(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls handshake failed: {0}")]
    Tls(String),
    #[error("http error: {0}")]
    Http(String),
}

/// Outcome of one completed HTTP exchange.
///
/// Durations are whole milliseconds; a phase that did not happen is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub status_code: u16,
    pub ttfb_ms: u64,
    pub dns_lookup_ms: u64,
    pub tls_handshake_ms: u64,
}

/// Make sure the host carries a scheme, defaulting to HTTPS.
pub fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Round a duration to whole milliseconds, halves away from zero.
pub fn round_millis(d: Duration) -> u64 {
    (d.as_secs_f64() * 1000.0).round() as u64
}
