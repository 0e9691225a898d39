use serde::Deserialize;
use std::time::Duration;

use crate::application::channel::ChannelSettings;
use crate::domain::sensor::SensorSpec;
use crate::domain::telemetry::SourceMode;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LabConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub tutor: TutorSettings,
    #[serde(default)]
    pub notes: NotesSettings,
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    #[serde(default = "default_fault_refresh_ms")]
    pub fault_refresh_ms: u64,
    #[serde(default = "default_offline_after_ms")]
    pub offline_after_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub default_source: SourceMode,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fault_refresh_ms: default_fault_refresh_ms(),
            offline_after_ms: default_offline_after_ms(),
            event_capacity: default_event_capacity(),
            default_source: SourceMode::default(),
        }
    }
}

fn default_fault_refresh_ms() -> u64 {
    200
}

fn default_offline_after_ms() -> u64 {
    10_000
}

fn default_event_capacity() -> usize {
    256
}

impl PipelineSettings {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            fault_refresh: Duration::from_millis(self.fault_refresh_ms),
            offline_after: Duration::from_millis(self.offline_after_ms),
            event_capacity: self.event_capacity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TutorSettings {
    /// Without a base URL the tutor answers from local fallback content only.
    pub base_url: Option<String>,
    #[serde(default = "default_tutor_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TutorSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_tutor_timeout_ms(),
        }
    }
}

fn default_tutor_timeout_ms() -> u64 {
    8_000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotesSettings {
    /// Notes stay in memory when no path is configured.
    pub path: Option<String>,
}

/// Loads `config/lab.{toml,..}` with `LAB__SECTION__KEY` environment overrides.
pub fn load_lab_config() -> anyhow::Result<LabConfig> {
    load_lab_config_from("config/lab")
}

pub fn load_lab_config_from(path: &str) -> anyhow::Result<LabConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("LAB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let lab: LabConfig = settings.try_deserialize()?;
    validate(&lab)?;
    Ok(lab)
}

/// Largest history window a sensor may configure.
pub const MAX_HISTORY_LEN: usize = 10_000;

fn validate(lab: &LabConfig) -> anyhow::Result<()> {
    let mut seen = std::collections::HashSet::new();
    for sensor in &lab.sensors {
        if !seen.insert(sensor.id.as_str()) {
            anyhow::bail!("duplicate sensor id in config: {}", sensor.id);
        }
        if !(1..=MAX_HISTORY_LEN).contains(&sensor.history_len) {
            anyhow::bail!(
                "sensor {} history_len {} outside 1..={}",
                sensor.id,
                sensor.history_len,
                MAX_HISTORY_LEN
            );
        }
        if let Some(range) = sensor.expected_range {
            if range.min > range.max {
                anyhow::bail!("sensor {} has min > max in expected_range", sensor.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> anyhow::Result<LabConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        let lab: LabConfig = settings.try_deserialize()?;
        validate(&lab)?;
        Ok(lab)
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let lab = from_toml("").unwrap();
        assert_eq!(lab.server.bind, "0.0.0.0:8080");
        assert_eq!(lab.pipeline.fault_refresh_ms, 200);
        assert_eq!(lab.pipeline.default_source, SourceMode::Synthetic);
        assert!(lab.tutor.base_url.is_none());
        assert!(lab.sensors.is_empty());

        let settings = lab.pipeline.channel_settings();
        assert_eq!(settings.fault_refresh, Duration::from_millis(200));
        assert_eq!(settings.offline_after, Duration::from_secs(10));
    }

    #[test]
    fn test_sensor_catalog_parses() {
        let lab = from_toml(
            r#"
            [pipeline]
            default_source = "push"

            [[sensors]]
            id = "ultrasonic"
            name = "HC-SR04 Ultrasonic"
            unit = "cm"
            raw_label = "Distance"
            history_len = 30
            expected_range = { min = 2.0, max = 400.0 }
            synthetic = { base = 120.0, amplitude = 60.0, period_ms = 20000, jitter = 1.5 }
            "#,
        )
        .unwrap();

        assert_eq!(lab.pipeline.default_source, SourceMode::Push);
        let sensor = &lab.sensors[0];
        assert_eq!(sensor.history_len, 30);
        assert_eq!(sensor.expected_range.map(|r| r.max), Some(400.0));
        assert!(sensor.push.is_none());
    }

    #[test]
    fn test_duplicate_ids_and_inverted_ranges_are_rejected() {
        let duplicate = r#"
            [[sensors]]
            id = "a"
            name = "A"
            unit = "u"
            raw_label = "A"
            synthetic = { base = 1.0 }

            [[sensors]]
            id = "a"
            name = "A2"
            unit = "u"
            raw_label = "A"
            synthetic = { base = 1.0 }
        "#;
        assert!(from_toml(duplicate).is_err());

        let inverted = r#"
            [[sensors]]
            id = "a"
            name = "A"
            unit = "u"
            raw_label = "A"
            expected_range = { min = 10.0, max = 0.0 }
            synthetic = { base = 1.0 }
        "#;
        assert!(from_toml(inverted).is_err());
    }

    #[test]
    fn test_history_len_must_be_bounded() {
        let sensor = |len: usize| {
            format!(
                r#"
                [[sensors]]
                id = "a"
                name = "A"
                unit = "u"
                raw_label = "A"
                history_len = {len}
                synthetic = {{ base = 1.0 }}
                "#
            )
        };
        assert!(from_toml(&sensor(0)).is_err());
        assert!(from_toml(&sensor(MAX_HISTORY_LEN + 1)).is_err());
        assert!(from_toml(&sensor(1_000_000_000_000)).is_err());
        assert_eq!(from_toml(&sensor(MAX_HISTORY_LEN)).unwrap().sensors[0].history_len, MAX_HISTORY_LEN);
    }

    #[test]
    fn test_shipped_config_loads() {
        let lab = load_lab_config_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config/lab")).unwrap();
        assert!(lab.sensors.len() >= 5);
        assert!(lab.sensors.iter().all(|s| s.history_len >= 20));
        assert!(lab.sensors.iter().any(|s| s.id == "gas"));
    }
}
