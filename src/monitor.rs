//! Target monitors and the monitoring engine.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Target;
use crate::probe::{self, CheckResult};

/// Per-target runtime state: the target definition plus its
/// consecutive-failure count and most recent result.
#[derive(Debug)]
pub struct TargetMonitor {
    target: Target,
    consecutive_failures: u32,
    last_result: Option<CheckResult>,
}

/// Pure read of a monitor's current state.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub name: String,
    pub url: String,
    pub critical: bool,
    pub consecutive_failures: u32,
    pub last_result: Option<CheckResult>,
}

impl TargetMonitor {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            consecutive_failures: 0,
            last_result: None,
        }
    }

    /// Probe the target once and update failure state.
    ///
    /// Probe errors are encoded in the result, never raised; a check can
    /// never abort the surrounding cycle.
    pub async fn check(&mut self, client: &reqwest::Client) -> CheckResult {
        let result = probe::check(client, &self.target).await;
        self.apply(result.clone());
        result
    }

    /// Apply a probe result: reset the failure count on success, increment
    /// it on failure.
    pub(crate) fn apply(&mut self, result: CheckResult) {
        if result.success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.last_result = Some(result);
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_result(&self) -> Option<&CheckResult> {
        self.last_result.as_ref()
    }

    pub fn status(&self) -> TargetStatus {
        TargetStatus {
            name: self.target.name.clone(),
            url: self.target.url.clone(),
            critical: self.target.critical,
            consecutive_failures: self.consecutive_failures,
            last_result: self.last_result.clone(),
        }
    }
}

/// Owns the set of target monitors and runs them each cycle.
pub struct MonitoringEngine {
    monitors: Vec<TargetMonitor>,
    client: reqwest::Client,
}

impl MonitoringEngine {
    pub fn new(targets: Vec<Target>, client: reqwest::Client) -> Self {
        let monitors = targets.into_iter().map(TargetMonitor::new).collect();
        Self { monitors, client }
    }

    /// Probe every target concurrently and collect results keyed by
    /// target name.
    ///
    /// Each monitor is updated only by its own probe's completion; the
    /// join below acts as the barrier before incident processing so no
    /// stale failure counts are read. A single target's failure never
    /// affects the others.
    pub async fn run_cycle(&mut self) -> BTreeMap<String, CheckResult> {
        let client = self.client.clone();
        let checks = self.monitors.iter_mut().map(|monitor| {
            let client = client.clone();
            async move {
                let result = monitor.check(&client).await;
                (monitor.target().name.clone(), result)
            }
        });

        futures::future::join_all(checks).await.into_iter().collect()
    }

    /// Monitors at or beyond the failure threshold, in configuration order.
    pub fn failing_targets(&self, threshold: u32) -> Vec<&TargetMonitor> {
        self.monitors
            .iter()
            .filter(|m| m.consecutive_failures >= threshold)
            .collect()
    }

    /// Status of all targets, in configuration order.
    pub fn all_status(&self) -> Vec<TargetStatus> {
        self.monitors.iter().map(TargetMonitor::status).collect()
    }

    pub fn monitors(&self) -> &[TargetMonitor] {
        &self.monitors
    }

    #[cfg(test)]
    pub(crate) fn monitors_mut(&mut self) -> &mut [TargetMonitor] {
        &mut self.monitors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> Target {
        Target {
            name: name.to_string(),
            url: format!("http://localhost/{}", name),
            method: "GET".to_string(),
            expected_status: 200,
            timeout: 5.0,
            critical: true,
        }
    }

    fn success() -> CheckResult {
        CheckResult::ok(200, 0.01)
    }

    fn failure() -> CheckResult {
        CheckResult::fail(Some(500), 0.01, "status code 500 != expected 200".to_string())
    }

    #[test]
    fn failures_increment_and_success_resets() {
        let mut monitor = TargetMonitor::new(target("api"));
        assert_eq!(monitor.consecutive_failures(), 0);
        assert!(monitor.last_result().is_none());

        monitor.apply(failure());
        monitor.apply(failure());
        monitor.apply(failure());
        assert_eq!(monitor.consecutive_failures(), 3);

        monitor.apply(success());
        assert_eq!(monitor.consecutive_failures(), 0);

        monitor.apply(failure());
        assert_eq!(monitor.consecutive_failures(), 1);
    }

    #[test]
    fn failure_count_matches_last_result() {
        // consecutive_failures == 0 iff the last result succeeded.
        let mut monitor = TargetMonitor::new(target("api"));
        for result in [success(), failure(), success(), failure(), failure()] {
            monitor.apply(result);
            let last = monitor.last_result().unwrap();
            assert_eq!(monitor.consecutive_failures() == 0, last.success);
        }
    }

    #[test]
    fn status_reflects_state() {
        let mut monitor = TargetMonitor::new(target("api"));
        monitor.apply(failure());

        let status = monitor.status();
        assert_eq!(status.name, "api");
        assert!(status.critical);
        assert_eq!(status.consecutive_failures, 1);
        assert!(!status.last_result.unwrap().success);
    }

    #[test]
    fn failing_targets_honors_threshold_and_order() {
        let targets = vec![target("a"), target("b"), target("c")];
        let mut engine = MonitoringEngine::new(targets, reqwest::Client::new());

        // a: 2 failures, b: healthy, c: 3 failures
        engine.monitors_mut()[0].apply(failure());
        engine.monitors_mut()[0].apply(failure());
        engine.monitors_mut()[1].apply(success());
        engine.monitors_mut()[2].apply(failure());
        engine.monitors_mut()[2].apply(failure());
        engine.monitors_mut()[2].apply(failure());

        let failing = engine.failing_targets(2);
        assert_eq!(failing.len(), 2);
        assert_eq!(failing[0].target().name, "a");
        assert_eq!(failing[1].target().name, "c");

        assert!(engine.failing_targets(4).is_empty());
    }

    /// Spawn a one-shot HTTP server returning a fixed status code.
    async fn serve_status(status: u16) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let body = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(body.as_bytes()).await;
            }
        });

        format!("http://{}/health", addr)
    }

    #[tokio::test]
    async fn run_cycle_probes_all_targets_and_keys_by_name() {
        let mut ok_target = target("up");
        ok_target.url = serve_status(200).await;
        let mut bad_target = target("down");
        bad_target.url = serve_status(503).await;

        let mut engine =
            MonitoringEngine::new(vec![ok_target, bad_target], reqwest::Client::new());
        let results = engine.run_cycle().await;

        assert_eq!(results.len(), 2);
        assert!(results["up"].success);
        assert!(!results["down"].success);
        assert_eq!(results["down"].status_code, Some(503));

        // Monitor state was updated by the cycle itself.
        assert_eq!(engine.monitors()[0].consecutive_failures(), 0);
        assert_eq!(engine.monitors()[1].consecutive_failures(), 1);
        assert!(engine.monitors()[1].last_result().is_some());
    }

    #[test]
    fn all_status_in_configuration_order() {
        let targets = vec![target("zeta"), target("alpha")];
        let engine = MonitoringEngine::new(targets, reqwest::Client::new());

        let status = engine.all_status();
        assert_eq!(status[0].name, "zeta");
        assert_eq!(status[1].name, "alpha");
    }
}
