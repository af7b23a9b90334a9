//! Minimal OpenAI-compatible HTTP client shared by the embedding provider
//! and the field extractor.
//!
//! Transient failures are retried with exponential backoff:
//!
//! | Outcome | Action |
//! |---------|--------|
//! | 2xx | parse JSON body |
//! | 429 or 5xx | retry |
//! | other 4xx | fail immediately |
//! | transport error | retry |
//!
//! Delays are 1s, 2s, 4s, ... capped at 32s.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

const MAX_BACKOFF_EXPONENT: u32 = 5;

pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAIClient {
    /// Build a client reading `OPENAI_API_KEY` from the environment.
    pub fn from_env(base_url: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    /// POST `body` to `{base_url}/{endpoint}` and return the JSON reply.
    pub async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(endpoint, attempt, ?delay, "retrying OpenAI request");
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(anyhow::Error::from(e).context(format!("POST {}", endpoint)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }
            let text = response.text().await.unwrap_or_default();
            let err = anyhow!("OpenAI API error {}: {}", status, text);
            if !is_retryable(status) {
                return Err(err);
            }
            last_err = Some(err);
        }

        match last_err {
            Some(e) => Err(e.context(format!("giving up after {} retries", self.max_retries))),
            None => bail!("OpenAI request to {} was never attempted", endpoint),
        }
    }
}

/// 429 and server errors are worth another attempt.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_secs(1 << exp)
}
