// Anomaly detection - rule-based diagnostics over the history window
use serde::{Deserialize, Serialize};

use super::history::HistoryEntry;

pub const STUCK_RUN_LENGTH: usize = 5;
pub const NOISE_RELATIVE_LIMIT: f64 = 0.2;
pub const NOISE_ABSOLUTE_LIMIT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    Spike,
    Drop,
    Drift,
    Noise,
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub min: f64,
    pub max: f64,
}

impl ExpectedRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub possible_causes: &'static [&'static str],
    pub suggested_fixes: &'static [&'static str],
}

const STUCK_CAUSES: &[&str] = &[
    "Sensor output pin shorted to ground or supply",
    "Loose or broken signal wire",
    "Sensor element saturated or physically damaged",
    "Firmware reading a cached value instead of sampling",
];
const STUCK_FIXES: &[&str] = &[
    "Check the wiring between the sensor and the microcontroller",
    "Power-cycle the sensor module",
    "Verify the sampling code reads the pin on every cycle",
    "Swap in a known-good sensor to isolate the fault",
];

const SPIKE_CAUSES: &[&str] = &[
    "Real environmental event (gas leak, heat source, obstruction)",
    "Electrical interference on the signal line",
    "ADC saturation from an overvoltage input",
    "Incorrect calibration offset",
];
const SPIKE_FIXES: &[&str] = &[
    "Confirm the reading with a second sensor or manual measurement",
    "Add shielding or a decoupling capacitor near the sensor",
    "Check the supply voltage and the ADC reference",
    "Review and reset the calibration offset",
];

const NOISE_CAUSES: &[&str] = &[
    "Electromagnetic interference from motors or power lines",
    "Unstable or noisy power supply",
    "Poor ground connection",
    "Sensor placed in turbulent airflow or vibrating mount",
];
const NOISE_FIXES: &[&str] = &[
    "Enable the moving-average filter",
    "Use twisted or shielded cable for the signal line",
    "Add a decoupling capacitor across the sensor supply",
    "Secure the sensor mount and move it away from noise sources",
];

/// Evaluates every rule over the window, in fixed order: stuck, range, noise.
pub fn detect_anomalies(history: &[HistoryEntry], expected: Option<ExpectedRange>) -> Vec<Anomaly> {
    let values: Vec<Option<f64>> = history.iter().map(|e| e.raw).collect();

    [
        detect_stuck(&values),
        expected.and_then(|range| detect_out_of_range(&values, range)),
        detect_noise(&values, expected),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn detect_stuck(values: &[Option<f64>]) -> Option<Anomaly> {
    if values.len() < STUCK_RUN_LENGTH {
        return None;
    }

    let tail = &values[values.len() - STUCK_RUN_LENGTH..];
    let first = tail[0]?;
    if !tail.iter().all(|v| *v == Some(first)) {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::Stuck,
        severity: Severity::Warning,
        title: "Sensor reading stuck".to_string(),
        description: format!(
            "The last {} readings are all exactly {}. The sensor may be frozen.",
            STUCK_RUN_LENGTH, first
        ),
        possible_causes: STUCK_CAUSES,
        suggested_fixes: STUCK_FIXES,
    })
}

fn detect_out_of_range(values: &[Option<f64>], range: ExpectedRange) -> Option<Anomaly> {
    let latest = values.last().copied().flatten()?;
    if range.contains(latest) {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::Spike,
        severity: Severity::Critical,
        title: "Reading out of expected range".to_string(),
        description: format!(
            "Latest reading {} is outside the expected range {} to {}.",
            latest, range.min, range.max
        ),
        possible_causes: SPIKE_CAUSES,
        suggested_fixes: SPIKE_FIXES,
    })
}

/// Samples already reported as out of range are left out of the statistics.
fn detect_noise(values: &[Option<f64>], expected: Option<ExpectedRange>) -> Option<Anomaly> {
    let samples: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| expected.is_none_or(|range| range.contains(*v)))
        .collect();
    let (mean, std_dev) = mean_and_std_dev(&samples)?;

    if !(std_dev > NOISE_RELATIVE_LIMIT * mean && std_dev > NOISE_ABSOLUTE_LIMIT) {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::Noise,
        severity: Severity::Warning,
        title: "Excessive signal noise".to_string(),
        description: format!(
            "Standard deviation {:.2} is more than {}% of the mean {:.2}.",
            std_dev,
            NOISE_RELATIVE_LIMIT * 100.0,
            mean
        ),
        possible_causes: NOISE_CAUSES,
        suggested_fixes: NOISE_FIXES,
    })
}

/// Mean and population standard deviation.
pub fn mean_and_std_dev(samples: &[f64]) -> Option<(f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
