//! The scheduling loop driving fixed-interval monitoring cycles.
//!
//! Each cycle probes every target, then processes incident transitions
//! and alerts, then samples metrics, and finally sleeps for whatever is
//! left of the interval. A cooperative stop signal is checked at the top
//! of each cycle; in-flight work always finishes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};

use crate::alert::AlertDispatcher;
use crate::config::Config;
use crate::db::{IncidentDetails, Store};
use crate::incident::IncidentTracker;
use crate::metrics::{MetricThresholds, MetricsSource};
use crate::monitor::{MonitoringEngine, TargetStatus};
use crate::probe::CheckResult;

/// Raw metric snapshots are kept this many days.
const METRIC_RETENTION_DAYS: i64 = 7;

/// Published once per completed cycle for the status query surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub targets: Vec<TargetStatus>,
    pub active_incidents: usize,
    pub persistence_healthy: bool,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Owns the engine, tracker and dispatcher and drives them in cycles.
pub struct Scheduler {
    engine: MonitoringEngine,
    tracker: IncidentTracker,
    dispatcher: Arc<Mutex<AlertDispatcher>>,
    store: Arc<Store>,
    metrics_source: Option<Box<dyn MetricsSource>>,
    thresholds: MetricThresholds,
    failure_threshold: u32,
    interval: Duration,
    snapshot: Arc<RwLock<StatusSnapshot>>,
}

impl Scheduler {
    pub fn new(
        engine: MonitoringEngine,
        tracker: IncidentTracker,
        dispatcher: Arc<Mutex<AlertDispatcher>>,
        store: Arc<Store>,
        config: &Config,
    ) -> Self {
        Self {
            engine,
            tracker,
            dispatcher,
            store,
            metrics_source: None,
            thresholds: config.alerts.thresholds.clone(),
            failure_threshold: config.monitoring.failure_threshold,
            interval: config.check_interval_duration(),
            snapshot: Arc::new(RwLock::new(StatusSnapshot {
                persistence_healthy: true,
                ..StatusSnapshot::default()
            })),
        }
    }

    /// Attach an external metrics source sampled once per cycle.
    pub fn with_metrics_source(mut self, source: Box<dyn MetricsSource>) -> Self {
        self.metrics_source = Some(source);
        self
    }

    /// Handle for the status query surface; always reflects the latest
    /// successfully-completed cycle.
    pub fn snapshot_handle(&self) -> Arc<RwLock<StatusSnapshot>> {
        self.snapshot.clone()
    }

    /// Run cycles until the stop signal flips.
    pub async fn run(mut self, stop: watch::Receiver<bool>) {
        tracing::info!(
            "scheduler started: {} target(s), interval {:.1}s, threshold {}",
            self.engine.monitors().len(),
            self.interval.as_secs_f64(),
            self.failure_threshold
        );

        let mut stop = stop;
        loop {
            if *stop.borrow() {
                break;
            }

            let cycle_start = Instant::now();
            self.run_once().await;

            // Sleep out the remainder of the interval; never negative,
            // never catching up on overruns.
            let sleep = self.interval.saturating_sub(cycle_start.elapsed());
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped sender means nobody can ever signal us;
                    // treat it as a stop request rather than spinning.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        tracing::info!("scheduler stopped");
        if let Ok(stats) = self.tracker.statistics() {
            tracing::info!(
                "final statistics: {} total, {} active, {} resolved, avg {:.2}s",
                stats.total_incidents,
                stats.active_incidents,
                stats.resolved_incidents,
                stats.average_duration_seconds
            );
        }
    }

    /// One full cycle: probe all targets, then process transitions and
    /// metrics on the completed results.
    async fn run_once(&mut self) {
        let results = self.engine.run_cycle().await;
        self.process_results(&results).await;
        self.collect_metrics().await;
        self.log_status();
        self.publish_snapshot().await;
    }

    /// Turn completed probe results into incident transitions and alerts.
    ///
    /// Runs strictly after the cycle's join barrier, so failure counts are
    /// never stale. Serialized in the single loop, so the store is never
    /// written concurrently.
    pub(crate) async fn process_results(&mut self, results: &BTreeMap<String, CheckResult>) {
        // Targets failing beyond threshold with no open incident.
        let mut to_open = Vec::new();
        for monitor in self.engine.failing_targets(self.failure_threshold) {
            let target = monitor.target();
            if self.tracker.has_active_incident(&target.name) {
                continue;
            }
            let Some(result) = results.get(&target.name) else {
                continue;
            };
            let details = IncidentDetails {
                url: target.url.clone(),
                error: result.error.clone(),
                status_code: result.status_code,
                response_time: Some(result.response_time),
                consecutive_failures: monitor.consecutive_failures(),
            };
            to_open.push((target.name.clone(), target.critical, details));
        }

        for (name, critical, details) in to_open {
            let id = self.tracker.start_incident(&name, details);
            tracing::error!("ALERT: {} is DOWN (incident {})", name, id);

            if let Some(incident) = self.tracker.get_active_incident(&name).cloned() {
                self.dispatcher
                    .lock()
                    .await
                    .dispatch_incident_alert(&incident, critical)
                    .await;
            }
        }

        // Recovered targets with an open incident.
        let to_close: Vec<String> = self
            .engine
            .monitors()
            .iter()
            .filter(|m| m.consecutive_failures() == 0)
            .map(|m| m.target().name.clone())
            .filter(|name| self.tracker.has_active_incident(name))
            .collect();

        for name in to_close {
            if let Some(resolved) = self.tracker.end_incident(&name) {
                tracing::info!(
                    "RESOLVED: {} is UP (incident {}, {:.2}s)",
                    name,
                    resolved.id,
                    resolved.duration_seconds.unwrap_or(0.0)
                );
                self.dispatcher
                    .lock()
                    .await
                    .dispatch_recovery(&resolved)
                    .await;
            }
        }
    }

    /// Sample the external metrics source, persist the snapshot and run
    /// threshold alerts over it.
    async fn collect_metrics(&mut self) {
        let Some(source) = &self.metrics_source else {
            return;
        };

        let snapshot = source.collect().await;
        if let Err(e) = self.store.add_metric_snapshot(&snapshot) {
            tracing::error!("failed to persist metric snapshot: {}", e);
        }

        let cutoff = Utc::now() - chrono::Duration::days(METRIC_RETENTION_DAYS);
        if let Err(e) = self.store.delete_metric_snapshots_before(cutoff) {
            tracing::error!("failed to prune old metric snapshots: {}", e);
        }

        self.dispatcher
            .lock()
            .await
            .dispatch_metric_alerts(&snapshot, &self.thresholds)
            .await;
    }

    fn log_status(&self) {
        let statuses = self.engine.all_status();
        let down = statuses
            .iter()
            .filter(|s| s.consecutive_failures > 0)
            .count();
        tracing::info!("status: {} UP / {} DOWN", statuses.len() - down, down);

        for status in &statuses {
            if status.consecutive_failures > 0 {
                tracing::warn!(
                    "{}: {} consecutive failure(s)",
                    status.name,
                    status.consecutive_failures
                );
            }
        }
    }

    async fn publish_snapshot(&self) {
        let snapshot = StatusSnapshot {
            targets: self.engine.all_status(),
            active_incidents: self.tracker.active_count(),
            persistence_healthy: self.tracker.persistence_healthy(),
            last_cycle: Some(Utc::now()),
        };
        *self.snapshot.write().await = snapshot;
    }
}
