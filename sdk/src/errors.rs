//! Error types and handling
//!
//! This module provides the top-level error type shared by the engine and the
//! memory proxy. Every variant implements `UserFacing`, which yields a short
//! hint that is safe to show to end users.
//!
//! # Security
//!
//! Error messages never carry credentials. Callers that embed upstream
//! response bodies are expected to scrub them first.

use thiserror::Error;

/// Extension trait for errors that surface to end users
pub trait UserFacing {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains secrets or internal details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by the user (for example by sending
    /// the message again). Non-recoverable errors need a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing application configuration
/// - **Storage**: Session store read/write failures
/// - **Memory service**: Failures talking to the memory store
/// - **Completion service**: Failures talking to the LLM provider
/// - **Validation**: Rejected input before any network call
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, UserFacing};
///
/// let error = EngineError::MissingCredential("mem0ApiKey".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Remote service errors
    #[error("Memory service error: {0}")]
    MemoryService(String),

    #[error("Completion service error: {0}")]
    CompletionService(String),

    #[error("Credential rejected by {0}")]
    CredentialRejected(String),

    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UserFacing for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingCredential(_) => "Set your API keys with 'mnemo session set-key'",
            Self::Storage(_) => "Could not read or write session settings",
            Self::MemoryService(_) => "Memory service unavailable. Try again later",
            Self::CompletionService(_) => "The model did not answer. Try sending again",
            Self::CredentialRejected(_) => "An API key was rejected. Check your keys",
            Self::Validation(_) => "Message rejected. Type something first",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::MissingCredential(_) | Self::CredentialRejected(_)
        )
    }
}
