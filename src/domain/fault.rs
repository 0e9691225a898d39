// Fault injection - simulated sensor malfunctions
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Saturated 10-bit ADC reading.
pub const STUCK_HIGH_VALUE: f64 = 1023.0;
pub const DEFAULT_NOISE_AMPLITUDE: f64 = 50.0;
/// Upper bound on the noise span so the uniform sampler never overflows.
pub const MAX_NOISE_AMPLITUDE: f64 = 1.0e6;
pub const DEFAULT_DRIFT_RATE: f64 = 0.5;
pub const DEFAULT_DRIFT_PERIOD_MS: i64 = 10_000;
pub const DEFAULT_OFFSET_VALUE: f64 = 0.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultMode {
    #[default]
    None,
    StuckAtZero,
    StuckAtHigh,
    OpenCircuit,
    NoiseBurst,
    Drift,
    Offset,
}

impl FaultMode {
    /// Dynamic modes change over time even when the input does not.
    pub fn is_dynamic(self) -> bool {
        matches!(self, FaultMode::NoiseBurst | FaultMode::Drift)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultParams {
    pub noise_amplitude: Option<f64>,
    pub drift_rate: Option<f64>,
    pub drift_period_ms: Option<i64>,
    pub offset_value: Option<f64>,
}

impl FaultParams {
    fn noise_amplitude(&self) -> f64 {
        match self.noise_amplitude {
            Some(a) if a.is_finite() => a.abs().min(MAX_NOISE_AMPLITUDE),
            _ => DEFAULT_NOISE_AMPLITUDE,
        }
    }

    fn drift_rate(&self) -> f64 {
        self.drift_rate
            .filter(|r| r.is_finite())
            .unwrap_or(DEFAULT_DRIFT_RATE)
    }

    fn drift_period_ms(&self) -> i64 {
        self.drift_period_ms
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_DRIFT_PERIOD_MS)
    }

    fn offset_value(&self) -> f64 {
        self.offset_value
            .filter(|o| o.is_finite())
            .unwrap_or(DEFAULT_OFFSET_VALUE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    #[serde(rename = "type")]
    pub mode: FaultMode,
    #[serde(default)]
    pub params: FaultParams,
}

impl FaultConfig {
    pub fn new(mode: FaultMode) -> Self {
        Self {
            mode,
            params: FaultParams::default(),
        }
    }

    pub fn with_params(mode: FaultMode, params: FaultParams) -> Self {
        Self { mode, params }
    }
}

/// Sawtooth ramp: `(now mod period) * 0.001 * rate`, resetting to 0 every period.
pub fn drift_offset(now_ms: i64, rate: f64, period_ms: i64) -> f64 {
    now_ms.rem_euclid(period_ms) as f64 * 0.001 * rate
}

/// Maps a true value to the value a sensor with the given fault would report.
pub fn inject_fault<R: Rng>(
    true_value: Option<f64>,
    config: &FaultConfig,
    now_ms: i64,
    rng: &mut R,
) -> Option<f64> {
    let params = &config.params;
    match config.mode {
        FaultMode::None => true_value,
        FaultMode::StuckAtZero => Some(0.0),
        FaultMode::StuckAtHigh => Some(STUCK_HIGH_VALUE),
        FaultMode::OpenCircuit => None,
        FaultMode::NoiseBurst => {
            let half = params.noise_amplitude() / 2.0;
            true_value.map(|v| v + rng.gen_range(-half..=half))
        }
        FaultMode::Drift => true_value
            .map(|v| v + drift_offset(now_ms, params.drift_rate(), params.drift_period_ms())),
        FaultMode::Offset => true_value.map(|v| v + params.offset_value()),
    }
}

/// Owns the active fault config and the randomness the noise mode draws from.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(config: FaultConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Swaps the whole config at once; params are never patched in place.
    pub fn replace(&mut self, config: FaultConfig) {
        self.config = config;
    }

    pub fn inject(&mut self, true_value: Option<f64>, now_ms: i64) -> Option<f64> {
        inject_fault(true_value, &self.config, now_ms, &mut self.rng)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new(FaultConfig::default())
    }
}
