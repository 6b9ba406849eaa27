//! OpenRouter Completion Gateway
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. OpenRouter is
//! the default, but the base URL comes from configuration.

use async_trait::async_trait;
use reqwest::Client;
use sdk::types::ChatMessage;
use std::time::Duration;
use tracing::debug;

use super::{parse_completion, CompletionError, CompletionGateway, CompletionRequest, Result};
use crate::secrets::{scrub, SecretString};

pub struct OpenRouterGateway {
    base_url: String,
    client: Client,
}

impl OpenRouterGateway {
    /// Create a new gateway
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://openrouter.ai/api/v1"
    /// * `timeout` - Per-request timeout; the only bound on a slow completion
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl CompletionGateway for OpenRouterGateway {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        credential: &SecretString,
    ) -> Result<ChatMessage> {
        if credential.is_empty() {
            return Err(CompletionError::MissingCredential);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let payload = CompletionRequest::new(model, messages);

        debug!(
            "Requesting completion from {} ({} messages, model {})",
            url,
            messages.len(),
            model
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", credential.unsecure()),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| CompletionError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = scrub(&response.text().await.unwrap_or_default());

            return match status.as_u16() {
                401 | 403 => Err(CompletionError::AuthenticationFailed(text)),
                code => Err(CompletionError::Upstream {
                    status: code,
                    body: text,
                }),
            };
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        parse_completion(&data)
    }
}
