// Tutor service - quiz and explanation use cases with local fallback content
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::telemetry::ChannelSnapshot;

/// Number of most recent samples quoted to the tutor.
const SNIPPET_SAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<QuizQuestion>,
}

/// What the tutor is being asked about. Built per request, never shared globally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorContext {
    pub page: String,
    pub sensor_id: Option<String>,
    pub sensor_name: String,
    pub data_snippet: Option<String>,
}

impl TutorContext {
    pub fn new(page: impl Into<String>, sensor_name: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            sensor_id: None,
            sensor_name: sensor_name.into(),
            data_snippet: None,
        }
    }

    pub fn with_sensor_id(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data_snippet = Some(data.into());
        self
    }

    /// Summarises the live window: latest samples, fault, filter and findings.
    pub fn from_snapshot(sensor_name: &str, snapshot: &ChannelSnapshot) -> Self {
        let recent: Vec<String> = snapshot
            .points
            .iter()
            .rev()
            .take(SNIPPET_SAMPLES)
            .rev()
            .map(|p| match p.raw {
                Some(v) => format!("{:.2}", v),
                None => "missing".to_string(),
            })
            .collect();
        let findings: Vec<&str> = snapshot.anomalies.iter().map(|a| a.title.as_str()).collect();

        let snippet = format!(
            "recent {} readings: [{}]; fault: {:?}; filter: {:?}; calibration offset: {}; anomalies: [{}]",
            snapshot.unit,
            recent.join(", "),
            snapshot.fault.mode,
            snapshot.filter.mode,
            snapshot.calibration_offset,
            findings.join("; "),
        );

        Self::new(format!("sensors/{}", snapshot.sensor_id), sensor_name)
            .with_sensor_id(snapshot.sensor_id.clone())
            .with_data(snippet)
    }
}

#[async_trait]
pub trait TutorClient: Send + Sync {
    async fn quiz(&self, context: &TutorContext) -> anyhow::Result<Quiz>;

    async fn explain(&self, context: &TutorContext) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct TutorService {
    client: Option<Arc<dyn TutorClient>>,
}

impl TutorService {
    pub fn new(client: Option<Arc<dyn TutorClient>>) -> Self {
        Self { client }
    }

    pub async fn quiz(&self, context: &TutorContext) -> Quiz {
        if let Some(client) = &self.client {
            match client.quiz(context).await {
                Ok(quiz) if !quiz.questions.is_empty() => return quiz,
                Ok(_) => tracing::warn!(sensor = %context.sensor_name, "tutor returned an empty quiz, using fallback"),
                Err(e) => tracing::warn!(sensor = %context.sensor_name, error = %e, "tutor quiz failed, using fallback"),
            }
        }
        fallback_quiz(&context.sensor_name)
    }

    pub async fn explain(&self, context: &TutorContext) -> String {
        if let Some(client) = &self.client {
            match client.explain(context).await {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => tracing::warn!(sensor = %context.sensor_name, "tutor returned an empty explanation, using fallback"),
                Err(e) => tracing::warn!(sensor = %context.sensor_name, error = %e, "tutor explain failed, using fallback"),
            }
        }
        fallback_explanation(context)
    }
}

fn options(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn fallback_quiz(sensor_name: &str) -> Quiz {
    Quiz {
        questions: vec![
            QuizQuestion {
                question: format!(
                    "The {} reports the exact same value for many consecutive samples. What is the most likely fault?",
                    sensor_name
                ),
                options: options(&[
                    "A stuck sensor or broken signal line",
                    "Normal environmental stability",
                    "Too high a sampling rate",
                    "A calibration offset",
                ]),
                correct_index: 0,
                explanation: "Real signals always fluctuate slightly. Identical readings over a long run usually mean the sensor output is frozen or disconnected.".to_string(),
            },
            QuizQuestion {
                question: format!(
                    "Which filter best smooths random noise on the {} signal?",
                    sensor_name
                ),
                options: options(&[
                    "Threshold gate",
                    "Moving average",
                    "No filter",
                    "Stuck-at-zero",
                ]),
                correct_index: 1,
                explanation: "A moving average replaces each sample with the mean of the last few, cancelling out uncorrelated noise at the cost of a small lag.".to_string(),
            },
            QuizQuestion {
                question: format!(
                    "The {} suddenly reads 1023 and stays there. What does this value suggest?",
                    sensor_name
                ),
                options: options(&[
                    "The sensor is measuring its maximum physical range",
                    "The 10-bit ADC input is saturated",
                    "The moving average window is too small",
                    "The device lost Wi-Fi",
                ]),
                correct_index: 1,
                explanation: "1023 is the largest value a 10-bit ADC can produce. A constant 1023 usually means the input is shorted to the supply or the sensor is saturated.".to_string(),
            },
        ],
    }
}

pub fn fallback_explanation(context: &TutorContext) -> String {
    let mut text = format!(
        "The {} converts a physical quantity into an electrical signal that the microcontroller samples periodically. \
         Look for three things in the chart: values that never change (a stuck sensor), values outside the sensor's \
         expected range (spikes or saturation), and rapid random variation (noise). Filters such as a moving average \
         can reduce noise, while a calibration offset corrects a constant bias.",
        context.sensor_name
    );
    if let Some(data) = &context.data_snippet {
        text.push_str(&format!(" Current data: {}.", data));
    }
    text
}
