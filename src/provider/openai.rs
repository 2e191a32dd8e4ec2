//! OpenAI-compatible embeddings client.
//!
//! Talks to `POST {api_base}/embeddings` with a bearer token. Transient
//! failures (timeouts, 429, 5xx) are retried with exponential backoff and
//! jitter up to the configured attempt budget; everything else surfaces
//! immediately as permanent.

use std::time::Duration;

use anyhow::Context;
use rand::random;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::provider::{EmbeddingProvider, ProviderError};

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_attempts: u32,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, api_key: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "provider API key is empty");

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("provider API key is not a valid header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build embeddings HTTP client")?;

        let endpoint = format!("{}/embeddings", config.api_base.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_attempts: config.max_retries.max(1),
        })
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut attempt = 0u32;

        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: Some(self.dimensions),
            };

            let err = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return self.parse_response(resp, inputs.len()).await;
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry_status(status) {
                        ProviderError::Transient(format!("{status}: {body}"))
                    } else {
                        ProviderError::Permanent(format!("{status}: {body}"))
                    }
                }
                Err(err) => classify_request_error(&err),
            };

            if err.is_transient() && attempt + 1 < self.max_attempts {
                attempt += 1;
                let delay = retry_backoff(attempt);
                log::info!(
                    "embeddings request failed, retrying (attempt {}/{}) after {}ms: {}",
                    attempt,
                    self.max_attempts,
                    delay.as_millis(),
                    err
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(err);
        }
    }

    async fn parse_response(
        &self,
        resp: reqwest::Response,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|err| ProviderError::Permanent(format!("malformed embedding response: {err}")))?;

        // the API may return entries out of order
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != expected {
            return Err(ProviderError::Permanent(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                expected
            )));
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for entry in parsed.data {
            if entry.embedding.len() != self.dimensions {
                return Err(ProviderError::DimensionMismatch {
                    expected: self.dimensions,
                    got: entry.embedding.len(),
                });
            }
            vectors.push(entry.embedding);
        }

        Ok(vectors)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let mut vectors = self.request(&[text]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(ProviderError::EmptyInput);
        }

        let inputs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
        self.request(&inputs).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn id(&self) -> String {
        format!("openai:{}:{}", self.model, self.dimensions)
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_request_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Permanent(err.to_string())
    }
}

fn retry_backoff(attempt: u32) -> Duration {
    let capped = attempt.min(5);
    Duration::from_millis(500 * 2u64.pow(capped - 1) + random::<u64>() % 250)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
