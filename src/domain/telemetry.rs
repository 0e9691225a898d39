// Telemetry data domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::anomaly::Anomaly;
use super::fault::FaultConfig;
use super::filter::FilterConfig;

/// A field inside a device push message; digital inputs arrive as booleans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FieldValue::Number(n) => n,
            FieldValue::Flag(true) => 1.0,
            FieldValue::Flag(false) => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub uptime_ms: u64,
    pub version: String,
    pub wifi_rssi: i32,
    pub free_heap: u64,
}

/// Message pushed by a device or the mock-data backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub device_id: String,
    pub timestamp: String,
    pub sensors: HashMap<String, HashMap<String, FieldValue>>,
    #[serde(default)]
    pub system: Option<SystemInfo>,
}

impl PushMessage {
    /// Parses the ISO-8601 timestamp, if it is one.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
    pub system: Option<SystemInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Synthetic,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapshotPoint {
    pub timestamp: DateTime<Utc>,
    pub raw: Option<f64>,
    pub processed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub sensor_id: String,
    pub unit: String,
    pub status: ConnectionStatus,
    pub source: SourceMode,
    pub fault: FaultConfig,
    pub filter: FilterConfig,
    pub calibration_offset: f64,
    /// Latest fault-injected value, refreshed by dynamic faults between samples.
    pub live_value: Option<f64>,
    pub points: Vec<SnapshotPoint>,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ChannelEvent {
    Live {
        at: DateTime<Utc>,
        value: Option<f64>,
    },
    Snapshot(ChannelSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_message_schema() {
        let json = r#"{
            "device_id": "esp32-lab-01",
            "timestamp": "2024-03-01T10:15:30Z",
            "sensors": {
                "dht22": { "temperature": 23.4, "humidity": 41 },
                "pir": { "motion": true }
            },
            "system": { "uptime_ms": 120000, "version": "1.2.0", "wifi_rssi": -61, "free_heap": 182344 }
        }"#;
        let msg: PushMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.device_id, "esp32-lab-01");
        assert_eq!(msg.sensors["dht22"]["temperature"].as_f64(), 23.4);
        assert_eq!(msg.sensors["pir"]["motion"].as_f64(), 1.0);
        assert_eq!(msg.system.as_ref().map(|s| s.wifi_rssi), Some(-61));
        assert!(msg.parsed_timestamp().is_some());
    }

    #[test]
    fn test_push_message_without_system_block() {
        let msg: PushMessage = serde_json::from_str(
            r#"{"device_id":"d","timestamp":"not a time","sensors":{}}"#,
        )
        .unwrap();
        assert!(msg.system.is_none());
        assert!(msg.parsed_timestamp().is_none());
    }

    #[test]
    fn test_live_event_is_tagged() {
        let event = ChannelEvent::Live {
            at: DateTime::<Utc>::UNIX_EPOCH,
            value: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "live");
        assert!(json["value"].is_null());
    }
}
