//! Turn Orchestrator
//!
//! Owns the transcript and drives one turn at a time:
//!
//! 1. Reject empty input, unusable configuration, or a turn already in flight
//! 2. Append the user message, store it as a user memory (detached), append
//!    the pending placeholder
//! 3. Search both memory partitions concurrently; a failed search counts as
//!    an empty result
//! 4. Assemble the request and call the completion service
//! 5. Success: replace the placeholder, store the reply as an agent memory
//!    (detached, role rewritten to `user`), announce `MemoriesChanged`
//! 6. Failure: remove the placeholder and surface the error
//!
//! The busy flag is held by a guard for the whole turn. Dropping the guard
//! also removes a placeholder left behind, so a cancelled `send` future never
//! leaves the transcript mid-turn.

use sdk::errors::{EngineError, UserFacing};
use sdk::types::{ChatMessage, OwnerKind, Role};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::prompt::build_request;
use super::transcript::{Message, Transcript};
use crate::llm::{CompletionError, CompletionGateway};
use crate::memory::{spawn_write, MemoryGateway, PartitionedMemories};
use crate::message_bus::{Event, EventBus};
use crate::secrets::SecretString;
use crate::session::SessionConfig;

/// Why a turn was rejected or failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A turn is already in flight")]
    Busy,

    #[error("Credential rejected: {0}")]
    Auth(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Completion returned no choices")]
    EmptyChoices,

    #[error("Network error: {0}")]
    Network(String),
}

impl From<CompletionError> for TurnError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::MissingCredential => {
                TurnError::Validation("completion credential is missing".to_string())
            }
            CompletionError::AuthenticationFailed(body) => TurnError::Auth(body),
            CompletionError::Upstream { status, body } => {
                TurnError::Upstream(format!("HTTP {}: {}", status, body))
            }
            CompletionError::Malformed(reason) => TurnError::Upstream(reason),
            CompletionError::EmptyChoices => TurnError::EmptyChoices,
            CompletionError::NetworkError(reason) => TurnError::Network(reason),
        }
    }
}

impl UserFacing for TurnError {
    fn user_hint(&self) -> &str {
        match self {
            TurnError::Validation(_) => "Enter a message and make sure both API keys are set",
            TurnError::Busy => "Wait for the current reply before sending again",
            TurnError::Auth(_) => "The completion service rejected the API key",
            TurnError::Upstream(_) => "The completion service returned an error",
            TurnError::EmptyChoices => "The model returned no reply",
            TurnError::Network(_) => "Could not reach the completion service",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, TurnError::Auth(_))
    }
}

impl From<TurnError> for EngineError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Validation(msg) => EngineError::Validation(msg),
            TurnError::Busy => EngineError::Validation("a turn is already in flight".to_string()),
            TurnError::Auth(_) => EngineError::CredentialRejected("completion service".to_string()),
            TurnError::Upstream(msg) => EngineError::CompletionService(msg),
            TurnError::EmptyChoices => {
                EngineError::CompletionService("completion returned no choices".to_string())
            }
            TurnError::Network(msg) => EngineError::Network(msg),
        }
    }
}

/// Drives turns for one session
pub struct TurnOrchestrator {
    config: RwLock<SessionConfig>,
    transcript: RwLock<Transcript>,
    busy: AtomicBool,
    memory: Arc<dyn MemoryGateway>,
    completion: Arc<dyn CompletionGateway>,
    bus: Arc<EventBus>,
    writes: Mutex<Vec<JoinHandle<()>>>,
}

/// Holds the busy flag for one turn
struct TurnGuard<'a> {
    orchestrator: &'a TurnOrchestrator,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.write_transcript().discard_pending();
        self.orchestrator.busy.store(false, Ordering::Release);
    }
}

impl TurnOrchestrator {
    /// Create an orchestrator whose transcript opens with the greeting
    pub fn new(
        config: SessionConfig,
        memory: Arc<dyn MemoryGateway>,
        completion: Arc<dyn CompletionGateway>,
        bus: Arc<EventBus>,
    ) -> Self {
        let transcript = Transcript::with_greeting(config.initial_message.clone());
        Self {
            config: RwLock::new(config),
            transcript: RwLock::new(transcript),
            busy: AtomicBool::new(false),
            memory,
            completion,
            bus,
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Run one turn for `input`.
    ///
    /// Returns the assistant reply as it was appended to the transcript.
    pub async fn send(&self, input: &str) -> Result<ChatMessage, TurnError> {
        if input.trim().is_empty() {
            return Err(TurnError::Validation("message is empty".to_string()));
        }

        // Read-copy: a settings change cannot reach an in-flight turn
        let config = self.config();
        if !config.is_usable() {
            let missing: Vec<&str> = config
                .missing_credentials()
                .iter()
                .map(|f| f.key())
                .collect();
            return Err(TurnError::Validation(format!(
                "missing credentials: {}",
                missing.join(", ")
            )));
        }

        let _guard = self.acquire()?;
        let turn_id = Uuid::new_v4().to_string();
        info!("Turn {} started", turn_id);
        self.bus
            .publish(Event::TurnStarted {
                turn_id: turn_id.clone(),
            })
            .await;

        let user_message = ChatMessage::user(input);
        self.write_transcript()
            .push(Message::from(user_message.clone()));
        self.store_memory(
            user_message,
            OwnerKind::User,
            &config.user_id,
            &config.memory_api_key,
        );
        self.write_transcript().push_pending();

        let memories = self.search_both(input, &config).await;
        debug!(
            "Turn {} found {} user / {} companion memories",
            turn_id,
            memories.user.len(),
            memories.agent.len()
        );

        let request = build_request(&config.system_prompt, &self.read_transcript(), &memories);

        match self
            .completion
            .complete(&config.model, &request, &config.completion_api_key)
            .await
        {
            Ok(reply) => {
                self.write_transcript()
                    .resolve_pending(Message::from(reply.clone()));
                self.store_memory(
                    reply.clone().with_role(Role::User),
                    OwnerKind::Agent,
                    &config.agent_id,
                    &config.memory_api_key,
                );

                info!("Turn {} resolved", turn_id);
                self.bus.publish(Event::TurnResolved { turn_id }).await;
                self.bus.publish(Event::MemoriesChanged).await;
                Ok(reply)
            }
            Err(e) => {
                self.write_transcript().discard_pending();
                let err = TurnError::from(e);

                error!("Turn {} failed: {}", turn_id, err);
                self.bus
                    .publish(Event::TurnFailed {
                        turn_id,
                        error: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    /// Restore the transcript to the current greeting
    pub fn reset(&self) -> Result<(), TurnError> {
        let _guard = self.acquire()?;
        let greeting = self.config().initial_message;
        *self.write_transcript() = Transcript::with_greeting(greeting);
        debug!("Transcript reset");
        Ok(())
    }

    /// Use `config` for subsequent turns
    pub fn update_config(&self, config: SessionConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    /// Snapshot of the configuration used by the next turn
    pub fn config(&self) -> SessionConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Snapshot of the transcript
    pub fn transcript(&self) -> Transcript {
        self.read_transcript().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Wait for every outstanding memory write
    pub async fn flush_writes(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut writes = self
                .writes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            writes.drain(..).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Memory write task ended abnormally: {}", e);
            }
        }
    }

    fn acquire(&self) -> Result<TurnGuard<'_>, TurnError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TurnError::Busy)?;
        Ok(TurnGuard { orchestrator: self })
    }

    async fn search_both(&self, query: &str, config: &SessionConfig) -> PartitionedMemories {
        let (user, agent) = futures::join!(
            self.search_or_empty(query, OwnerKind::User, &config.user_id, &config.memory_api_key),
            self.search_or_empty(query, OwnerKind::Agent, &config.agent_id, &config.memory_api_key),
        );
        PartitionedMemories { user, agent }
    }

    async fn search_or_empty(
        &self,
        query: &str,
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Vec<String> {
        match self.memory.search(query, owner, id, credential).await {
            Ok(hits) => hits.into_iter().map(|hit| hit.text).collect(),
            Err(e) => {
                warn!("Search of {} memories failed, continuing without: {}", owner, e);
                Vec::new()
            }
        }
    }

    fn store_memory(&self, message: ChatMessage, owner: OwnerKind, id: &str, credential: &SecretString) {
        let handle = spawn_write(
            Arc::clone(&self.memory),
            vec![message],
            owner,
            id.to_string(),
            credential.clone(),
        );

        let mut writes = self
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writes.retain(|h| !h.is_finished());
        writes.push(handle);
    }

    fn read_transcript(&self) -> RwLockReadGuard<'_, Transcript> {
        self.transcript
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_transcript(&self) -> RwLockWriteGuard<'_, Transcript> {
        self.transcript
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
