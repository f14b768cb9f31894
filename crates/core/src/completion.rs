use crate::config::RetryPolicy;
use crate::error::CollaboratorError;
use crate::traits::CompletionClient;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: Option<String>,
}

/// Completion client for a JSON endpoint that accepts `{model, prompt}` and
/// answers `{text}`. Attempts are retried with exponential backoff per the
/// owned [`RetryPolicy`]; the orchestrator never retries on its own.
pub struct HttpCompletionClient {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
    client: Client,
}

impl HttpCompletionClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            api_key,
            model: model.into(),
            retry: RetryPolicy::default(),
            client: Client::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&CompletionRequest {
            model: &self.model,
            prompt,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CollaboratorError::BackendResponse {
                backend: "completion".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: CompletionResponse = response.json().await?;
        payload
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| CollaboratorError::BackendResponse {
                backend: "completion".to_string(),
                details: "response carried no text".to_string(),
            })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.attempt(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    warn!(attempt = attempt + 1, attempts, %error, "completion attempt failed");
                    last_error = Some(error);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        Err(
            last_error.unwrap_or_else(|| CollaboratorError::BackendResponse {
                backend: "completion".to_string(),
                details: "no attempts were made".to_string(),
            }),
        )
    }
}
