//! Completion Gateway
//!
//! Typed client over a single remote chat-completion operation. The
//! `CompletionGateway` trait is the seam the turn orchestrator depends on;
//! [`openrouter::OpenRouterGateway`] is the HTTP implementation for
//! OpenAI-compatible providers.
//!
//! There is no streaming and no retry: one call, one answer or one error.

use async_trait::async_trait;
use sdk::types::{ChatMessage, Role};
use serde::Serialize;

use crate::secrets::SecretString;

pub mod openrouter;

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, CompletionError>;

/// Errors that can occur during a completion call
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion credential is missing")]
    MissingCredential,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Completion returned no choices")]
    EmptyChoices,

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Request body sent to the completion endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

impl<'a> CompletionRequest<'a> {
    /// Build a non-streaming request
    pub fn new(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            model,
            messages,
            stream: false,
        }
    }
}

/// Completion Gateway trait that all providers implement
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Returns the name of the provider (e.g., "openrouter")
    fn name(&self) -> &str;

    /// Ask the model for the next assistant message
    ///
    /// # Arguments
    /// * `model` - Provider-specific model identifier
    /// * `messages` - The ordered request, system messages included
    /// * `credential` - API key for the provider
    ///
    /// # Returns
    /// * `Ok(ChatMessage)` - The first choice, role defaulted to assistant
    /// * `Err(CompletionError)` - Auth, upstream, malformed, empty or network failure
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        credential: &SecretString,
    ) -> Result<ChatMessage>;
}

/// Extract the first choice from a chat-completion payload.
///
/// - no `choices` array: `Malformed`
/// - `choices: []`: `EmptyChoices`
/// - missing or unknown `role`: defaults to assistant
/// - missing or null `content`: empty string
pub fn parse_completion(data: &serde_json::Value) -> Result<ChatMessage> {
    let choices = data
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| CompletionError::Malformed("No choices in response".to_string()))?;

    let choice = choices.first().ok_or(CompletionError::EmptyChoices)?;

    let message = choice
        .get("message")
        .ok_or_else(|| CompletionError::Malformed("No message in choice".to_string()))?;

    let role = match message.get("role").and_then(|r| r.as_str()) {
        Some("user") => Role::User,
        Some("system") => Role::System,
        _ => Role::Assistant,
    };

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(ChatMessage { role, content })
}
