//! Probe module for target health checks.
//!
//! A probe performs a single HTTP request against a target and classifies
//! the outcome. All outcomes, including transport errors, are encoded in
//! the returned [`CheckResult`]; a probe never fails with an error of its
//! own.

mod http;

pub use http::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub success: bool,
    pub status_code: Option<u16>,
    /// Response time in seconds.
    pub response_time: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    /// A successful check with the given status code.
    pub fn ok(status_code: u16, response_time: f64) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            response_time,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed check with an error description.
    pub fn fail(status_code: Option<u16>, response_time: f64, error: String) -> Self {
        Self {
            success: false,
            status_code,
            response_time,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}
