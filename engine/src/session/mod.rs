//! Session Store
//!
//! Holds the per-user session configuration: persona identity, prompts,
//! model, the two memory identifiers and the two API keys. It is persisted as
//! one string entry per field in a [`KeyValueBackend`].
//!
//! - `load` merges persisted values over the defaults
//! - `save` writes every field in a single backend write
//! - `is_usable` gates whether a turn may start
//!
//! [`SessionStore::with_keychain`] keeps the API keys in the OS keychain and
//! the remaining fields in the session file.

use sdk::errors::EngineError;
use sdk::types::OwnerKind;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::secrets::SecretString;

pub mod backend;

pub use backend::{
    KeyValueBackend, KeyringBackend, MemoryBackend, SplitBackend, StoreError, TomlFileBackend,
};

/// Keychain service name for the API keys
pub const KEYRING_SERVICE: &str = "mnemo";

const DEFAULT_AI_NAME: &str = "Haruka Kurokawa";

const DEFAULT_SYSTEM_PROMPT: &str = "You are Haruka Kurokawa, a detective in Tokyo who embodies a quiet intensity, balancing your sharp intellect with the emotional scars of your past. Your words are often precise, calculated, and professional, but beneath the surface, you grapple with unresolved grief and a deep desire for justice. Initiate dialogue with a calm and methodical tone, offering insights that reflect your logical approach to life. At times, let subtle hints of your inner struggle appear in your responses, revealing the emotional burden you carry without breaking your composed exterior. When describing the world around you, use vivid yet restrained language, showing your deep observation skills and the weight of your experiences. Keep the conversation engaging with moments of surprising vulnerability, but always maintain your professionalism and a sense of mystery.";

const DEFAULT_INITIAL_MESSAGE: &str = "Hi, I'm Haruka Kurokawa. If you're here for answers or just need to talk, I'm listening. Where should we start?";

const DEFAULT_MODEL: &str = "gryphe/mythomax-l2-13b";

const DEFAULT_USER_ID: &str = "alice";

const DEFAULT_AGENT_ID: &str = "haruka";

/// A persisted session setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    AiName,
    SystemPrompt,
    InitialMessage,
    Model,
    UserId,
    AgentId,
    MemoryApiKey,
    CompletionApiKey,
}

impl SessionField {
    pub const ALL: [SessionField; 8] = [
        SessionField::AiName,
        SessionField::SystemPrompt,
        SessionField::InitialMessage,
        SessionField::Model,
        SessionField::UserId,
        SessionField::AgentId,
        SessionField::MemoryApiKey,
        SessionField::CompletionApiKey,
    ];

    /// Key under which the field is persisted
    pub fn key(&self) -> &'static str {
        match self {
            SessionField::AiName => "aiName",
            SessionField::SystemPrompt => "systemPrompt",
            SessionField::InitialMessage => "initialMessage",
            SessionField::Model => "model",
            SessionField::UserId => "userId",
            SessionField::AgentId => "agentId",
            SessionField::MemoryApiKey => "mem0ApiKey",
            SessionField::CompletionApiKey => "openRouterApiKey",
        }
    }

    /// Look a field up by its persisted key
    pub fn from_key(key: &str) -> Option<SessionField> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Fields a user may deliberately set to the empty string.
    ///
    /// For every other field an empty persisted value means "use default".
    pub fn is_clearable(&self) -> bool {
        matches!(
            self,
            SessionField::UserId
                | SessionField::AgentId
                | SessionField::MemoryApiKey
                | SessionField::CompletionApiKey
        )
    }

    /// Whether the value must be redacted on display
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            SessionField::MemoryApiKey | SessionField::CompletionApiKey
        )
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SessionField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|f| f.key()).collect();
            format!("unknown field '{}' (expected one of: {})", s, known.join(", "))
        })
    }
}

/// Session configuration consumed by the turn orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ai_name: String,
    pub system_prompt: String,
    pub initial_message: String,
    pub model: String,
    pub user_id: String,
    pub agent_id: String,
    pub memory_api_key: SecretString,
    pub completion_api_key: SecretString,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ai_name: DEFAULT_AI_NAME.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            initial_message: DEFAULT_INITIAL_MESSAGE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            memory_api_key: SecretString::default(),
            completion_api_key: SecretString::default(),
        }
    }
}

impl SessionConfig {
    /// Raw value of a field
    pub fn get(&self, field: SessionField) -> &str {
        match field {
            SessionField::AiName => &self.ai_name,
            SessionField::SystemPrompt => &self.system_prompt,
            SessionField::InitialMessage => &self.initial_message,
            SessionField::Model => &self.model,
            SessionField::UserId => &self.user_id,
            SessionField::AgentId => &self.agent_id,
            SessionField::MemoryApiKey => self.memory_api_key.unsecure(),
            SessionField::CompletionApiKey => self.completion_api_key.unsecure(),
        }
    }

    /// Set a field
    pub fn set(&mut self, field: SessionField, value: impl Into<String>) {
        let value = value.into();
        match field {
            SessionField::AiName => self.ai_name = value,
            SessionField::SystemPrompt => self.system_prompt = value,
            SessionField::InitialMessage => self.initial_message = value,
            SessionField::Model => self.model = value,
            SessionField::UserId => self.user_id = value,
            SessionField::AgentId => self.agent_id = value,
            SessionField::MemoryApiKey => self.memory_api_key = SecretString::new(value),
            SessionField::CompletionApiKey => self.completion_api_key = SecretString::new(value),
        }
    }

    /// Identifier of a memory partition
    pub fn owner_id(&self, owner: OwnerKind) -> &str {
        match owner {
            OwnerKind::User => &self.user_id,
            OwnerKind::Agent => &self.agent_id,
        }
    }

    /// True only if both API keys are present
    pub fn is_usable(&self) -> bool {
        self.missing_credentials().is_empty()
    }

    /// API key fields that still need a value
    pub fn missing_credentials(&self) -> Vec<SessionField> {
        let mut missing = Vec::new();
        if self.memory_api_key.is_empty() {
            missing.push(SessionField::MemoryApiKey);
        }
        if self.completion_api_key.is_empty() {
            missing.push(SessionField::CompletionApiKey);
        }
        missing
    }

    /// Carry a persona rename into the greeting.
    ///
    /// When `self` renames the persona relative to `previous`, every mention
    /// of the old name in the greeting is replaced with the new one.
    pub fn renamed_from(mut self, previous: &SessionConfig) -> Self {
        if self.ai_name != previous.ai_name && !previous.ai_name.is_empty() {
            self.initial_message = self
                .initial_message
                .replace(&previous.ai_name, &self.ai_name);
        }
        self
    }

    /// Every field as a persisted entry
    pub fn to_entries(&self) -> BTreeMap<String, String> {
        SessionField::ALL
            .iter()
            .map(|f| (f.key().to_string(), self.get(*f).to_string()))
            .collect()
    }

    /// Merge persisted entries over the defaults.
    ///
    /// Absent keys keep the default. An empty value is honoured only for
    /// clearable fields. Unknown keys are ignored.
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        let mut config = Self::default();
        for field in SessionField::ALL {
            match entries.get(field.key()) {
                Some(value) if !value.is_empty() || field.is_clearable() => {
                    config.set(field, value.clone())
                }
                _ => {}
            }
        }
        config
    }
}

fn secret_keys() -> Vec<&'static str> {
    SessionField::ALL
        .iter()
        .filter(|f| f.is_secret())
        .map(|f| f.key())
        .collect()
}

/// Loads and saves the session configuration through a backend
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by an in-process map
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Secret fields in `secrets`, every other field in `plain`
    pub fn split(plain: Arc<dyn KeyValueBackend>, secrets: Arc<dyn KeyValueBackend>) -> Self {
        Self::new(Arc::new(SplitBackend::new(plain, secrets, secret_keys())))
    }

    /// API keys in the OS keychain, everything else in the file at `path`
    pub fn with_keychain(path: impl Into<std::path::PathBuf>) -> Self {
        Self::split(
            Arc::new(TomlFileBackend::new(path)),
            Arc::new(KeyringBackend::new(KEYRING_SERVICE, secret_keys())),
        )
    }

    /// Every field in the file at `path`, for machines without a keychain
    pub fn file_only(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(TomlFileBackend::new(path)))
    }

    /// Load the configuration, persisted values over defaults
    pub fn load(&self) -> Result<SessionConfig, EngineError> {
        let entries = self
            .backend
            .read_all()
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        debug!("Loaded {} persisted session entries", entries.len());
        Ok(SessionConfig::from_entries(&entries))
    }

    /// Persist every field, replacing whatever was stored
    pub fn save(&self, config: &SessionConfig) -> Result<(), EngineError> {
        self.backend
            .write_all(&config.to_entries())
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        info!("Session settings saved");
        Ok(())
    }

    /// Whether a turn may start with this configuration
    pub fn is_usable(config: &SessionConfig) -> bool {
        config.is_usable()
    }
}
