//! Incident lifecycle tracking.
//!
//! Each target cycles between two states: clear (no active incident) and
//! active (incident open). Transitions are persisted before the in-memory
//! active set is updated, so a crash between the two can at worst leave a
//! duplicate persisted record, never lose one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::db::{DbError, Incident, IncidentDetails, IncidentStats, IncidentStatus, Store};

/// State machine turning sustained failures into tracked incidents.
pub struct IncidentTracker {
    store: Arc<Store>,
    active: HashMap<String, Incident>,
    persistence_healthy: bool,
}

impl IncidentTracker {
    /// Create a tracker, recovering any incidents left active by a
    /// previous run.
    pub fn new(store: Arc<Store>) -> Self {
        let active = match store.get_active_incidents() {
            Ok(incidents) => incidents
                .into_iter()
                .map(|i| (i.target.clone(), i))
                .collect(),
            Err(e) => {
                tracing::error!("failed to recover active incidents: {}", e);
                HashMap::new()
            }
        };

        if !active.is_empty() {
            tracing::info!("recovered {} active incident(s) from storage", active.len());
        }

        Self {
            store,
            active,
            persistence_healthy: true,
        }
    }

    /// Open an incident for a target.
    ///
    /// Callers are expected to guard with [`has_active_incident`]; if one
    /// is already active this is a no-op that warns and returns the
    /// existing id, so a bypassed guard cannot corrupt state.
    ///
    /// [`has_active_incident`]: IncidentTracker::has_active_incident
    pub fn start_incident(&mut self, target: &str, details: IncidentDetails) -> String {
        if let Some(existing) = self.active.get(target) {
            tracing::warn!(
                "incident already active for {} ({}), ignoring start",
                target,
                existing.id
            );
            return existing.id.clone();
        }

        let now = Utc::now();
        let id = format!("{}_{}", target, now.format("%Y%m%d_%H%M%S"));
        let incident = Incident {
            id: id.clone(),
            target: target.to_string(),
            start_time: now,
            end_time: None,
            duration_seconds: None,
            status: IncidentStatus::Active,
            details,
        };

        self.persist(&incident);
        self.active.insert(target.to_string(), incident);
        id
    }

    /// Close the active incident for a target, if any.
    ///
    /// Idempotent: returns `None` without side effects when no incident is
    /// active. Otherwise returns the resolved record.
    pub fn end_incident(&mut self, target: &str) -> Option<Incident> {
        let mut incident = self.active.get(target)?.clone();

        let end_time = Utc::now();
        incident.end_time = Some(end_time);
        incident.duration_seconds =
            Some((end_time - incident.start_time).num_milliseconds() as f64 / 1000.0);
        incident.status = IncidentStatus::Resolved;

        self.persist(&incident);
        self.active.remove(target);
        Some(incident)
    }

    pub fn has_active_incident(&self, target: &str) -> bool {
        self.active.contains_key(target)
    }

    pub fn get_active_incident(&self, target: &str) -> Option<&Incident> {
        self.active.get(target)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Most recent incidents, active and resolved, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<Incident>, DbError> {
        self.store.get_incident_history(limit)
    }

    /// Aggregate statistics over all persisted incidents.
    pub fn statistics(&self) -> Result<IncidentStats, DbError> {
        let records = self.store.get_incidents()?;
        Ok(compute_statistics(&records))
    }

    /// False after a persistence write has failed; monitoring continues
    /// in-memory but the stored history may be incomplete.
    pub fn persistence_healthy(&self) -> bool {
        self.persistence_healthy
    }

    fn persist(&mut self, incident: &Incident) {
        match self.store.write_incident(incident) {
            Ok(()) => self.persistence_healthy = true,
            Err(e) => {
                tracing::error!("failed to persist incident {}: {}", incident.id, e);
                self.persistence_healthy = false;
            }
        }
    }
}

/// Compute aggregate statistics over a set of incident records.
pub fn compute_statistics(records: &[Incident]) -> IncidentStats {
    let durations: Vec<f64> = records
        .iter()
        .filter(|i| i.status == IncidentStatus::Resolved)
        .filter_map(|i| i.duration_seconds)
        .collect();

    let resolved = records
        .iter()
        .filter(|i| i.status == IncidentStatus::Resolved)
        .count();
    let active = records.len() - resolved;

    let (avg, max, min) = if durations.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = durations.iter().sum();
        let max = durations.iter().cloned().fold(f64::MIN, f64::max);
        let min = durations.iter().cloned().fold(f64::MAX, f64::min);
        (sum / durations.len() as f64, max, min)
    };

    IncidentStats {
        total_incidents: records.len(),
        resolved_incidents: resolved,
        active_incidents: active,
        average_duration_seconds: avg,
        max_duration_seconds: max,
        min_duration_seconds: min,
    }
}
