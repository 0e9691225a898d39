// Sensor catalog domain model
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use super::anomaly::ExpectedRange;

/// Closed-form "digital twin" signal: `base + amplitude * sin(2*pi*t/period) + jitter`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalProfile {
    pub base: f64,
    #[serde(default)]
    pub amplitude: f64,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub jitter: f64,
    /// Presence-style sensors report 1 while the wave is above `base`, else 0.
    #[serde(default)]
    pub binary: bool,
}

fn default_period_ms() -> u64 {
    60_000
}

impl SignalProfile {
    pub fn sample<R: Rng>(&self, now_ms: i64, rng: &mut R) -> f64 {
        let period = self.period_ms.max(1) as f64;
        let phase = (now_ms as f64 / period) * TAU;
        let wave = self.amplitude * phase.sin();
        let jitter = self.jitter.abs();
        let noise = if jitter > 0.0 && jitter.is_finite() {
            rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };

        if self.binary {
            if wave + noise > 0.0 { 1.0 } else { 0.0 }
        } else {
            self.base + wave + noise
        }
    }
}

/// Where a sensor's value lives inside a device push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMapping {
    pub channel: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    pub id: String,
    pub name: String,
    pub unit: String,
    /// Column header used for the raw series in CSV exports.
    pub raw_label: String,
    pub expected_range: Option<ExpectedRange>,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    pub synthetic: SignalProfile,
    pub push: Option<PushMapping>,
}

fn default_history_len() -> usize {
    50
}

fn default_sample_interval_ms() -> u64 {
    1_000
}

impl SensorSpec {
    pub fn matches_push(&self, channel: &str, field: &str) -> bool {
        self.push
            .as_ref()
            .is_some_and(|p| p.channel == channel && p.field == field)
    }
}
