//! Alert dispatch: threshold evaluation, cooldown gating and bounded
//! alert history.
//!
//! Two alerting surfaces share the dispatcher: metric-threshold alerts,
//! rate-limited per metric key, and incident-transition alerts emitted on
//! every open and close. Transport failures are recorded, never raised.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::db::Incident;
use crate::metrics::{MetricKey, MetricSnapshot, MetricThresholds};
use crate::notify::{AlertFields, Notifier, Severity};

/// One dispatch attempt, kept in the bounded in-memory history.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub key: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the notifier actually delivered it.
    pub sent: bool,
}

/// Decides whether and what to send to the notifier.
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    cooldown: ChronoDuration,
    last_sent: HashMap<String, DateTime<Utc>>,
    history: VecDeque<AlertRecord>,
    capacity: usize,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, cooldown_seconds: u64, capacity: usize) -> Self {
        Self {
            notifier,
            cooldown: ChronoDuration::seconds(cooldown_seconds as i64),
            last_sent: HashMap::new(),
            history: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Evaluate a metric snapshot against thresholds and dispatch one
    /// alert per exceeded metric whose cooldown window has elapsed.
    ///
    /// Returns the alerts that passed the cooldown gate.
    pub async fn dispatch_metric_alerts(
        &mut self,
        snapshot: &MetricSnapshot,
        thresholds: &MetricThresholds,
    ) -> Vec<AlertRecord> {
        self.dispatch_metric_alerts_at(snapshot, thresholds, Utc::now())
            .await
    }

    async fn dispatch_metric_alerts_at(
        &mut self,
        snapshot: &MetricSnapshot,
        thresholds: &MetricThresholds,
        now: DateTime<Utc>,
    ) -> Vec<AlertRecord> {
        let mut dispatched = Vec::new();

        for (key, value) in &snapshot.values {
            let threshold = thresholds.threshold_for(key);
            // Strict greater-than, not >=.
            if *value <= threshold {
                continue;
            }

            let cooldown_key = key.to_string();
            if !self.should_send(&cooldown_key, now) {
                continue;
            }

            let message = metric_message(key, *value, threshold);
            tracing::warn!("[ALERT] {}", message);

            let fields = AlertFields {
                service: cooldown_key.clone(),
                incident_id: None,
                timestamp: now,
                details: message.clone(),
            };
            let sent = self
                .notifier
                .send(Severity::Warning, &message, &fields)
                .await;

            let record = AlertRecord {
                key: cooldown_key,
                severity: Severity::Warning,
                message,
                timestamp: now,
                sent,
            };
            self.record(record.clone());
            dispatched.push(record);
        }

        dispatched
    }

    /// Dispatch a down alert for a newly opened incident.
    ///
    /// Incident transitions are already deduplicated by the tracker (one
    /// incident per failing streak), so they bypass the cooldown gate.
    pub async fn dispatch_incident_alert(&mut self, incident: &Incident, critical: bool) -> bool {
        let severity = if critical {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let message = format!("ALERT: {} is DOWN", incident.target);

        let d = &incident.details;
        let mut details = format!("*URL:* {}\n", d.url);
        if let Some(error) = &d.error {
            details.push_str(&format!("*Error:* `{}`\n", error));
        }
        if let Some(status_code) = d.status_code {
            details.push_str(&format!("*Status code:* {}\n", status_code));
        }
        if let Some(response_time) = d.response_time {
            details.push_str(&format!("*Response time:* {:.2}s\n", response_time));
        }
        details.push_str(&format!("*Consecutive failures:* {}", d.consecutive_failures));

        let fields = AlertFields {
            service: incident.target.clone(),
            incident_id: Some(incident.id.clone()),
            timestamp: Utc::now(),
            details,
        };
        let sent = self.notifier.send(severity, &message, &fields).await;

        self.record(AlertRecord {
            key: format!("incident:{}", incident.target),
            severity,
            message,
            timestamp: fields.timestamp,
            sent,
        });
        sent
    }

    /// Dispatch a recovery message for a resolved incident.
    pub async fn dispatch_recovery(&mut self, incident: &Incident) -> bool {
        let duration = format_duration(incident.duration_seconds.unwrap_or(0.0));
        let message = format!("RESOLVED: {} is UP after {}", incident.target, duration);

        let fields = AlertFields {
            service: incident.target.clone(),
            incident_id: Some(incident.id.clone()),
            timestamp: Utc::now(),
            details: format!("Service recovered after {}", duration),
        };
        let sent = self.notifier.send(Severity::Info, &message, &fields).await;

        self.record(AlertRecord {
            key: format!("recovery:{}", incident.target),
            severity: Severity::Info,
            message,
            timestamp: fields.timestamp,
            sent,
        });
        sent
    }

    /// The most recent alert records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// True if the cooldown window for the key has elapsed; stamps the key
    /// when it has.
    fn should_send(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_sent.get(key) {
            if now - *last < self.cooldown {
                return false;
            }
        }
        self.last_sent.insert(key.to_string(), now);
        true
    }

    fn record(&mut self, record: AlertRecord) {
        while self.history.len() >= self.capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

fn metric_message(key: &MetricKey, value: f64, threshold: f64) -> String {
    match key {
        MetricKey::Cpu => format!("CPU usage is at {}% (threshold: {}%)", value, threshold),
        MetricKey::Memory => format!("Memory usage is at {}% (threshold: {}%)", value, threshold),
        MetricKey::Swap => format!("Swap usage is at {}% (threshold: {}%)", value, threshold),
        MetricKey::Disk(mountpoint) => format!(
            "Disk usage on {} is at {}% (threshold: {}%)",
            mountpoint, value, threshold
        ),
    }
}

/// Format a duration in seconds for humans, truncating at each unit.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    if total < 60 {
        format!("{}s", total)
    } else if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{IncidentDetails, IncidentStatus};
    use crate::notify::testing::RecordingNotifier;
    use std::collections::BTreeMap;

    fn snapshot(entries: &[(MetricKey, f64)]) -> MetricSnapshot {
        let values: BTreeMap<MetricKey, f64> = entries.iter().cloned().collect();
        MetricSnapshot::new(values)
    }

    fn incident(target: &str) -> Incident {
        Incident {
            id: format!("{}_20250101_120000", target),
            target: target.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: None,
            status: IncidentStatus::Active,
            details: IncidentDetails {
                url: "http://localhost/health".to_string(),
                error: Some("timeout after 5s".to_string()),
                status_code: None,
                response_time: Some(5.0),
                consecutive_failures: 2,
            },
        }
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_alerts() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut dispatcher = AlertDispatcher::new(notifier.clone(), 300, 1000);
        let thresholds = MetricThresholds::default();
        let t0 = Utc::now();

        let sent = dispatcher
            .dispatch_metric_alerts_at(&snapshot(&[(MetricKey::Cpu, 95.0)]), &thresholds, t0)
            .await;
        assert_eq!(sent.len(), 1);

        // Ten seconds later: suppressed.
        let sent = dispatcher
            .dispatch_metric_alerts_at(
                &snapshot(&[(MetricKey::Cpu, 96.0)]),
                &thresholds,
                t0 + ChronoDuration::seconds(10),
            )
            .await;
        assert!(sent.is_empty());

        // After the window: dispatched again.
        let sent = dispatcher
            .dispatch_metric_alerts_at(
                &snapshot(&[(MetricKey::Cpu, 96.0)]),
                &thresholds,
                t0 + ChronoDuration::seconds(301),
            )
            .await;
        assert_eq!(sent.len(), 1);
        assert_eq!(notifier.count(), 2);
    }

    #[tokio::test]
    async fn threshold_comparison_is_strictly_greater() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut dispatcher = AlertDispatcher::new(notifier.clone(), 0, 1000);
        let thresholds = MetricThresholds::default();

        let sent = dispatcher
            .dispatch_metric_alerts(&snapshot(&[(MetricKey::Cpu, 80.0)]), &thresholds)
            .await;
        assert!(sent.is_empty());

        let sent = dispatcher
            .dispatch_metric_alerts(&snapshot(&[(MetricKey::Cpu, 80.1)]), &thresholds)
            .await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains("CPU usage is at 80.1%"));
    }

    #[tokio::test]
    async fn disk_alerts_are_keyed_per_mountpoint() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut dispatcher = AlertDispatcher::new(notifier.clone(), 300, 1000);
        let thresholds = MetricThresholds::default();

        let sent = dispatcher
            .dispatch_metric_alerts(
                &snapshot(&[
                    (MetricKey::Disk("/".to_string()), 95.0),
                    (MetricKey::Disk("/var".to_string()), 97.0),
                ]),
                &thresholds,
            )
            .await;

        assert_eq!(sent.len(), 2);
        let keys: Vec<&str> = sent.iter().map(|r| r.key.as_str()).collect();
        assert!(keys.contains(&"disk:/"));
        assert!(keys.contains(&"disk:/var"));
    }

    #[tokio::test]
    async fn incident_alert_severity_follows_criticality() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut dispatcher = AlertDispatcher::new(notifier.clone(), 300, 1000);

        assert!(dispatcher.dispatch_incident_alert(&incident("api"), true).await);
        assert!(dispatcher.dispatch_incident_alert(&incident("web"), false).await);

        let sends = notifier.sends.lock().unwrap();
        assert_eq!(sends[0].0, Severity::Critical);
        assert!(sends[0].1.contains("api is DOWN"));
        assert_eq!(sends[1].0, Severity::Warning);
    }

    #[tokio::test]
    async fn recovery_message_formats_duration() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut dispatcher = AlertDispatcher::new(notifier.clone(), 300, 1000);

        let mut resolved = incident("api");
        resolved.status = IncidentStatus::Resolved;
        resolved.duration_seconds = Some(90.0);

        assert!(dispatcher.dispatch_recovery(&resolved).await);
        let sends = notifier.sends.lock().unwrap();
        assert_eq!(sends[0].1, "RESOLVED: api is UP after 1m 30s");
        assert_eq!(sends[0].0, Severity::Info);
    }

    #[tokio::test]
    async fn notifier_failure_is_recorded_not_raised() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let mut dispatcher = AlertDispatcher::new(notifier, 300, 1000);

        let sent = dispatcher.dispatch_incident_alert(&incident("api"), true).await;
        assert!(!sent);

        let history = dispatcher.recent(10);
        assert_eq!(history.len(), 1);
        assert!(!history[0].sent);
    }

    #[tokio::test]
    async fn history_is_bounded_with_oldest_eviction() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut dispatcher = AlertDispatcher::new(notifier, 300, 3);

        for name in ["a", "b", "c", "d"] {
            dispatcher.dispatch_incident_alert(&incident(name), false).await;
        }

        let history = dispatcher.recent(10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].key, "incident:b");
        assert_eq!(history[2].key, "incident:d");

        // recent() itself also limits.
        assert_eq!(dispatcher.recent(2).len(), 2);
        assert_eq!(dispatcher.recent(2)[0].key, "incident:c");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(59.9), "59s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3599.0), "59m 59s");
        assert_eq!(format_duration(3600.0), "1h 0m");
        assert_eq!(format_duration(3665.0), "1h 1m");
        assert_eq!(format_duration(-5.0), "0s");
    }
}
