//! Persisted record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incident lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(IncidentStatus::Active),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

/// Snapshot of the failure captured when an incident opens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentDetails {
    pub url: String,
    pub error: Option<String>,
    pub status_code: Option<u16>,
    /// Response time of the triggering probe, in seconds.
    pub response_time: Option<f64>,
    pub consecutive_failures: u32,
}

/// A tracked period during which a target is failing beyond threshold.
///
/// Created when the threshold is first crossed, resolved exactly once when
/// the target recovers, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub target: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub status: IncidentStatus,
    pub details: IncidentDetails,
}

/// Aggregate statistics over persisted incidents.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentStats {
    pub total_incidents: usize,
    pub resolved_incidents: usize,
    pub active_incidents: usize,
    pub average_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub min_duration_seconds: f64,
}
