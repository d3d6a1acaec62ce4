//! Core data models for the pod monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive metadata for a pod returned by the locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodDescriptor {
    pub name: String,
    pub namespace: String,
    pub phase: Option<String>,
    pub host_ip: Option<String>,
    pub pod_ip: Option<String>,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub containers: Vec<ContainerSpec>,
}

impl PodDescriptor {
    /// Name of the container commands are executed in (the first one declared)
    pub fn primary_container(&self) -> Option<&str> {
        self.containers.first().map(|c| c.name.as_str())
    }
}

/// Container image and resource declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// One complete set of metrics collected from a pod at a single point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pod: String,
    pub namespace: String,
    pub cpu: CpuMetrics,
    #[serde(default, with = "empty_object")]
    pub memory: Option<MemoryMetrics>,
    #[serde(default, with = "empty_object")]
    pub disk: Option<DiskMetrics>,
    pub processes: Vec<ProcessMetrics>,
}

/// CPU utilisation and load averages; each field is set only if its probe parsed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_1min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_5min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_15min: Option<f64>,
}

impl CpuMetrics {
    pub fn is_empty(&self) -> bool {
        self.usage_percent.is_none()
            && self.load_1min.is_none()
            && self.load_5min.is_none()
            && self.load_15min.is_none()
    }
}

/// The three `/proc/loadavg` averages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Memory usage in megabytes as reported by `free -m`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    pub usage_percent: f64,
}

/// Root filesystem usage as reported by `df -h`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub filesystem: String,
    pub size: String,
    pub used: String,
    pub available: String,
    pub usage_percent: u32,
}

/// One row of `ps aux`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub user: String,
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub vsz: u64,
    pub rss: u64,
    #[serde(default)]
    pub command: String,
}

/// Serializes an absent record as `{}` and reads `{}` or `null` back as `None`.
mod empty_object {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Object(map) if map.is_empty() => Ok(None),
            other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            pod: "alpine-lab-7d9f".to_string(),
            namespace: "lab".to_string(),
            cpu: CpuMetrics {
                usage_percent: Some(12.5),
                ..Default::default()
            },
            memory: None,
            disk: Some(DiskMetrics {
                filesystem: "overlay".to_string(),
                size: "59G".to_string(),
                used: "12G".to_string(),
                available: "45G".to_string(),
                usage_percent: 21,
            }),
            processes: vec![],
        }
    }

    #[test]
    fn test_absent_records_serialize_as_empty_objects() {
        let json = serde_json::to_value(snapshot()).unwrap();

        assert_eq!(json["memory"], serde_json::json!({}));
        assert_eq!(json["disk"]["usage_percent"], 21);
        assert_eq!(json["cpu"], serde_json::json!({ "usage_percent": 12.5 }));
        assert!(json["processes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_json_roundtrip_keeps_absent_fields_absent() {
        let original = snapshot();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, original);
        assert!(parsed.memory.is_none());
        assert!(parsed.cpu.load_1min.is_none());
    }

    #[test]
    fn test_primary_container_is_first_declared() {
        let pod = PodDescriptor {
            name: "alpine-lab-0".to_string(),
            namespace: "default".to_string(),
            phase: None,
            host_ip: None,
            pod_ip: None,
            creation_timestamp: None,
            containers: vec![
                ContainerSpec {
                    name: "main".to_string(),
                    image: Some("alpine:3.19".to_string()),
                    limits: BTreeMap::new(),
                    requests: BTreeMap::new(),
                },
                ContainerSpec {
                    name: "sidecar".to_string(),
                    image: None,
                    limits: BTreeMap::new(),
                    requests: BTreeMap::new(),
                },
            ],
        };

        assert_eq!(pod.primary_container(), Some("main"));
    }
}
