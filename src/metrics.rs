//! Metric snapshot types and the metrics source boundary.
//!
//! The engine does not sample metrics itself. An external [`MetricsSource`]
//! supplies point-in-time snapshots; the core only reads the typed value
//! mapping to evaluate alert thresholds and persists the snapshot as-is.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A known metric subject to threshold alerting.
///
/// Disk usage is keyed per mountpoint since partitions are evaluated
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKey {
    Cpu,
    Memory,
    Swap,
    Disk(String),
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::Cpu => write!(f, "cpu"),
            MetricKey::Memory => write!(f, "memory"),
            MetricKey::Swap => write!(f, "swap"),
            MetricKey::Disk(mountpoint) => write!(f, "disk:{}", mountpoint),
        }
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricKey::Cpu),
            "memory" => Ok(MetricKey::Memory),
            "swap" => Ok(MetricKey::Swap),
            _ => match s.strip_prefix("disk:") {
                Some(mountpoint) => Ok(MetricKey::Disk(mountpoint.to_string())),
                None => Err(format!("unknown metric key: {}", s)),
            },
        }
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MetricKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A point-in-time metric snapshot.
///
/// `values` holds the known, alertable percentages; `extra` is a
/// pass-through bag for anything the source reports that alerting does
/// not evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<MetricKey, f64>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MetricSnapshot {
    pub fn new(values: BTreeMap<MetricKey, f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            values,
            extra: serde_json::Map::new(),
        }
    }
}

/// Alert thresholds per metric, in percent.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricThresholds {
    #[serde(default = "default_cpu")]
    pub cpu: f64,
    #[serde(default = "default_memory")]
    pub memory: f64,
    #[serde(default = "default_swap")]
    pub swap: f64,
    #[serde(default = "default_disk")]
    pub disk: f64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
            swap: default_swap(),
            disk: default_disk(),
        }
    }
}

impl MetricThresholds {
    pub fn threshold_for(&self, key: &MetricKey) -> f64 {
        match key {
            MetricKey::Cpu => self.cpu,
            MetricKey::Memory => self.memory,
            MetricKey::Swap => self.swap,
            MetricKey::Disk(_) => self.disk,
        }
    }
}

fn default_cpu() -> f64 {
    80.0
}

fn default_memory() -> f64 {
    85.0
}

fn default_swap() -> f64 {
    75.0
}

fn default_disk() -> f64 {
    90.0
}

/// Boundary for the external metric sampler.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn collect(&self) -> MetricSnapshot;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_key_round_trips_through_strings() {
        for key in [
            MetricKey::Cpu,
            MetricKey::Memory,
            MetricKey::Swap,
            MetricKey::Disk("/var".to_string()),
        ] {
            let parsed: MetricKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
        assert!("load".parse::<MetricKey>().is_err());
    }

    #[test]
    fn snapshot_serializes_keys_as_strings() {
        let mut values = BTreeMap::new();
        values.insert(MetricKey::Cpu, 42.5);
        values.insert(MetricKey::Disk("/".to_string()), 60.0);
        let snapshot = MetricSnapshot::new(values);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["values"]["cpu"], 42.5);
        assert_eq!(json["values"]["disk:/"], 60.0);

        let back: MetricSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.values.len(), 2);
    }

    #[test]
    fn default_thresholds_match_known_keys() {
        let thresholds = MetricThresholds::default();
        assert_eq!(thresholds.threshold_for(&MetricKey::Cpu), 80.0);
        assert_eq!(thresholds.threshold_for(&MetricKey::Memory), 85.0);
        assert_eq!(thresholds.threshold_for(&MetricKey::Swap), 75.0);
        assert_eq!(
            thresholds.threshold_for(&MetricKey::Disk("/".to_string())),
            90.0
        );
    }
}
