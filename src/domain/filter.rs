// Windowed filter - derives the processed overlay series from the raw window
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_SIZE: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    #[default]
    None,
    MovingAverage,
    Threshold,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub window_size: Option<usize>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub mode: FilterMode,
    #[serde(default)]
    pub params: FilterParams,
}

impl FilterConfig {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            params: FilterParams::default(),
        }
    }

    pub fn with_params(mode: FilterMode, params: FilterParams) -> Self {
        Self { mode, params }
    }

    pub fn window_size(&self) -> usize {
        self.params.window_size.unwrap_or(DEFAULT_WINDOW_SIZE)
    }

    pub fn threshold(&self) -> f64 {
        self.params.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Recomputes the whole processed series from the raw window.
    ///
    /// The output is index-aligned with `raw`. Missing samples stay missing.
    pub fn apply(&self, raw: &[Option<f64>]) -> Vec<Option<f64>> {
        match self.mode {
            FilterMode::None => raw.to_vec(),
            FilterMode::MovingAverage => moving_average(raw, self.window_size()),
            FilterMode::Threshold => threshold_gate(raw, self.threshold()),
        }
    }
}

/// Trailing mean over `window` samples; the first `window - 1` samples pass through.
fn moving_average(raw: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window <= 1 {
        return raw.to_vec();
    }

    raw.iter()
        .enumerate()
        .map(|(i, value)| {
            if i + 1 < window {
                return *value;
            }
            let slice = &raw[i + 1 - window..=i];
            let sum = slice.iter().copied().sum::<Option<f64>>()?;
            Some(sum / window as f64)
        })
        .collect()
}

/// Holds the previous output while consecutive raw samples differ by less than `threshold`.
fn threshold_gate(raw: &[Option<f64>], threshold: f64) -> Vec<Option<f64>> {
    let mut out: Vec<Option<f64>> = Vec::with_capacity(raw.len());

    for (i, value) in raw.iter().enumerate() {
        let held = match (i.checked_sub(1).map(|p| raw[p]), value) {
            (Some(Some(prev)), Some(curr)) if (curr - prev).abs() < threshold => {
                out.last().copied().flatten()
            }
            _ => *value,
        };
        out.push(held);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_none_is_a_copy() {
        let raw = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(FilterConfig::new(FilterMode::None).apply(&raw), raw);
    }

    #[test]
    fn test_moving_average_boundary() {
        let raw = series(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        let out = FilterConfig::new(FilterMode::MovingAverage).apply(&raw);

        assert_eq!(out.len(), raw.len());
        assert_eq!(&out[..4], &raw[..4]);
        assert_eq!(out[4], Some(30.0));
        assert_eq!(out[5], Some(40.0));
        assert_eq!(out[6], Some(50.0));
    }

    #[test]
    fn test_moving_average_custom_window_is_causal() {
        let cfg = FilterConfig::with_params(
            FilterMode::MovingAverage,
            FilterParams {
                window_size: Some(2),
                ..Default::default()
            },
        );
        let out = cfg.apply(&series(&[1.0, 3.0, 100.0]));
        assert_eq!(out, vec![Some(1.0), Some(2.0), Some(51.5)]);
    }

    #[test]
    fn test_moving_average_shorter_than_window_passes_through() {
        let raw = series(&[4.0, 8.0]);
        assert_eq!(FilterConfig::new(FilterMode::MovingAverage).apply(&raw), raw);
        assert!(FilterConfig::new(FilterMode::MovingAverage).apply(&[]).is_empty());
    }

    #[test]
    fn test_moving_average_zero_window_is_identity() {
        let cfg = FilterConfig::with_params(
            FilterMode::MovingAverage,
            FilterParams {
                window_size: Some(0),
                ..Default::default()
            },
        );
        let raw = series(&[1.0, 2.0, 3.0]);
        assert_eq!(cfg.apply(&raw), raw);
    }

    #[test]
    fn test_moving_average_missing_sample_poisons_its_windows() {
        let cfg = FilterConfig::with_params(
            FilterMode::MovingAverage,
            FilterParams {
                window_size: Some(2),
                ..Default::default()
            },
        );
        let out = cfg.apply(&[Some(2.0), None, Some(4.0), Some(6.0)]);
        assert_eq!(out, vec![Some(2.0), None, None, Some(5.0)]);
    }

    #[test]
    fn test_threshold_on_constant_input_is_identity() {
        let raw = series(&[5.0; 8]);
        assert_eq!(FilterConfig::new(FilterMode::Threshold).apply(&raw), raw);
    }

    #[test]
    fn test_threshold_holds_through_small_changes() {
        let raw = series(&[100.0, 104.0, 97.0, 130.0, 135.0, 90.0]);
        let out = FilterConfig::new(FilterMode::Threshold).apply(&raw);
        assert_eq!(
            out,
            series(&[100.0, 100.0, 100.0, 130.0, 130.0, 90.0])
        );
    }

    #[test]
    fn test_threshold_difference_equal_to_threshold_passes() {
        let cfg = FilterConfig::with_params(
            FilterMode::Threshold,
            FilterParams {
                threshold: Some(5.0),
                ..Default::default()
            },
        );
        assert_eq!(
            cfg.apply(&series(&[0.0, 5.0, 9.0])),
            series(&[0.0, 5.0, 5.0])
        );
    }

    #[test]
    fn test_threshold_after_missing_passes_raw() {
        let out = FilterConfig::new(FilterMode::Threshold).apply(&[Some(1.0), None, Some(2.0)]);
        assert_eq!(out, vec![Some(1.0), None, Some(2.0)]);
    }

    #[test]
    fn test_config_wire_shape() {
        let cfg: FilterConfig =
            serde_json::from_str(r#"{"type":"moving-average","params":{"windowSize":3}}"#).unwrap();
        assert_eq!(cfg.mode, FilterMode::MovingAverage);
        assert_eq!(cfg.window_size(), 3);
        assert_eq!(cfg.threshold(), DEFAULT_THRESHOLD);
    }
}
