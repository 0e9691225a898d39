// HTTP tutor client - AI quiz/explain endpoints
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::application::tutor::{Quiz, TutorClient, TutorContext};

#[derive(Debug, Clone)]
pub struct HttpTutorClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuizRequest<'a> {
    sensor_name: &'a str,
    sensor_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExplainRequest<'a> {
    sensor_name: &'a str,
    data: Option<&'a str>,
    page: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExplainResponse {
    explanation: String,
}

impl HttpTutorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build tutor HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Tutor request to {} failed with status {}: {}", url, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl TutorClient for HttpTutorClient {
    async fn quiz(&self, context: &TutorContext) -> Result<Quiz> {
        let request = QuizRequest {
            sensor_name: &context.sensor_name,
            sensor_id: context.sensor_id.as_deref(),
        };
        tracing::debug!(sensor = %context.sensor_name, "requesting tutor quiz");
        self.post_json("quiz", &request).await
    }

    async fn explain(&self, context: &TutorContext) -> Result<String> {
        let request = ExplainRequest {
            sensor_name: &context.sensor_name,
            data: context.data_snippet.as_deref(),
            page: &context.page,
        };
        tracing::debug!(sensor = %context.sensor_name, page = %context.page, "requesting tutor explanation");
        let response: ExplainResponse = self.post_json("explain", &request).await?;
        Ok(response.explanation)
    }
}
