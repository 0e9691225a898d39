// Lab service - sensor catalog, channel lifecycle and push ingestion
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::channel::{ChannelSettings, SensorChannel};
use crate::application::error::LabError;
use crate::domain::reading::Reading;
use crate::domain::sensor::SensorSpec;
use crate::domain::telemetry::{DeviceStatus, PushMessage, SourceMode};

#[derive(Debug, Clone, serde::Serialize)]
pub struct SensorSummary {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub mounted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestOutcome {
    pub delivered: usize,
    pub unmatched: usize,
}

#[derive(Clone)]
pub struct LabService {
    catalog: Arc<Vec<SensorSpec>>,
    settings: ChannelSettings,
    default_source: SourceMode,
    channels: Arc<RwLock<HashMap<String, Arc<SensorChannel>>>>,
    devices: Arc<RwLock<HashMap<String, DeviceStatus>>>,
}

impl LabService {
    pub fn new(catalog: Vec<SensorSpec>, settings: ChannelSettings, default_source: SourceMode) -> Self {
        Self {
            catalog: Arc::new(catalog),
            settings,
            default_source,
            channels: Arc::new(RwLock::new(HashMap::new())),
            devices: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn spec(&self, sensor_id: &str) -> Result<&SensorSpec, LabError> {
        self.catalog
            .iter()
            .find(|s| s.id == sensor_id)
            .ok_or_else(|| LabError::UnknownSensor(sensor_id.to_string()))
    }

    pub async fn list_sensors(&self) -> Vec<SensorSummary> {
        let channels = self.channels.read().await;
        self.catalog
            .iter()
            .map(|s| SensorSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                unit: s.unit.clone(),
                mounted: channels.contains_key(&s.id),
            })
            .collect()
    }

    /// Mounting an already mounted sensor returns the existing channel.
    pub async fn mount(&self, sensor_id: &str) -> Result<Arc<SensorChannel>, LabError> {
        let spec = self.spec(sensor_id)?.clone();
        let mut channels = self.channels.write().await;
        if let Some(existing) = channels.get(sensor_id) {
            return Ok(existing.clone());
        }

        let channel = Arc::new(SensorChannel::mount(spec, self.settings, self.default_source).await);
        channels.insert(sensor_id.to_string(), channel.clone());
        Ok(channel)
    }

    /// Tears the channel down and discards its window.
    pub async fn unmount(&self, sensor_id: &str) -> Result<(), LabError> {
        self.spec(sensor_id)?;
        let removed = self.channels.write().await.remove(sensor_id);
        match removed {
            Some(channel) => {
                channel.teardown().await;
                Ok(())
            }
            None => Err(LabError::NotMounted(sensor_id.to_string())),
        }
    }

    pub async fn channel(&self, sensor_id: &str) -> Result<Arc<SensorChannel>, LabError> {
        self.spec(sensor_id)?;
        self.channels
            .read()
            .await
            .get(sensor_id)
            .cloned()
            .ok_or_else(|| LabError::NotMounted(sensor_id.to_string()))
    }

    /// Routes every field of a push message to the mounted push-mode channel mapped to it.
    pub async fn ingest(&self, message: PushMessage) -> IngestOutcome {
        let received_at = Utc::now();
        let timestamp = message.parsed_timestamp().unwrap_or_else(|| {
            tracing::warn!(
                device = %message.device_id,
                timestamp = %message.timestamp,
                "unparseable push timestamp, using receive time"
            );
            received_at
        });

        let mut outcome = IngestOutcome::default();
        let channels: Vec<Arc<SensorChannel>> = self.channels.read().await.values().cloned().collect();

        for (source_channel, fields) in &message.sensors {
            for (field, value) in fields {
                let mut matched = false;
                for channel in channels.iter().filter(|c| c.spec().matches_push(source_channel, field)) {
                    if channel.source_mode().await != SourceMode::Push {
                        continue;
                    }
                    channel
                        .ingest(Reading::new(timestamp, Some(value.as_f64())))
                        .await;
                    matched = true;
                    outcome.delivered += 1;
                }
                if !matched {
                    outcome.unmatched += 1;
                    tracing::debug!(
                        device = %message.device_id,
                        channel = %source_channel,
                        field = %field,
                        "no push-mode channel for field"
                    );
                }
            }
        }

        self.devices.write().await.insert(
            message.device_id.clone(),
            DeviceStatus {
                device_id: message.device_id,
                last_seen: received_at,
                system: message.system,
            },
        );

        outcome
    }

    pub async fn devices(&self) -> Vec<DeviceStatus> {
        let mut devices: Vec<DeviceStatus> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Tears down every mounted channel.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<SensorChannel>> = self.channels.write().await.drain().map(|(_, c)| c).collect();
        for channel in drained {
            channel.teardown().await;
        }
    }
}
