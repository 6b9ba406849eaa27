//! Memory Gateway
//!
//! Typed client over the external memory store. Memories are partitioned by
//! [`OwnerKind`]: the end-user's memories live under the user identifier, the
//! persona's own memories under the agent identifier. The gateway owns no
//! state; every call goes to the remote store.
//!
//! Three operations:
//! - `retrieve`: the full memory set of one partition (settings/memory panel)
//! - `search`: relevance-filtered memories for a free-text query (turn time)
//! - `write`: add messages as new memories
//!
//! `write` is best-effort from the caller's perspective. Use [`spawn_write`]
//! to issue it as a detached task whose failure is logged and swallowed.

use async_trait::async_trait;
use sdk::types::{ChatMessage, OwnerKind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::secrets::SecretString;

pub mod mem0;
pub mod panel;

pub use mem0::Mem0Gateway;
pub use panel::MemoryPanel;

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors that can occur while talking to the memory store
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("No {0} identifier configured")]
    MissingIdentity(OwnerKind),

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// One search result: the memory text plus the untouched remote item
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub text: String,
    pub raw: serde_json::Value,
}

/// Memory texts of both partitions, kept apart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedMemories {
    pub user: Vec<String>,
    pub agent: Vec<String>,
}

impl PartitionedMemories {
    /// Memories of one partition
    pub fn get(&self, owner: OwnerKind) -> &[String] {
        match owner {
            OwnerKind::User => &self.user,
            OwnerKind::Agent => &self.agent,
        }
    }

    /// True when neither partition holds anything
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.agent.is_empty()
    }
}

/// Memory Gateway trait
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Fetch every memory text stored for `id` in the given partition.
    ///
    /// An empty remote result is an empty vector, not an error.
    async fn retrieve(
        &self,
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Result<Vec<String>>;

    /// Fetch the memories of one partition relevant to `query`.
    async fn search(
        &self,
        query: &str,
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Result<Vec<MemoryHit>>;

    /// Store `messages` as new memories of one partition.
    async fn write(
        &self,
        messages: &[ChatMessage],
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Result<()>;
}

/// Issue a memory write as a detached task.
///
/// The write never blocks the caller and never reports an error: failures are
/// logged at warn level and dropped. The returned handle lets an owner wait
/// for outstanding writes (see `TurnOrchestrator::flush_writes`); dropping it
/// does not cancel the write.
pub fn spawn_write(
    gateway: Arc<dyn MemoryGateway>,
    messages: Vec<ChatMessage>,
    owner: OwnerKind,
    id: String,
    credential: SecretString,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match gateway.write(&messages, owner, &id, &credential).await {
            Ok(()) => debug!("Stored {} message(s) as {} memories", messages.len(), owner),
            Err(e) => warn!("Failed to store {} memories (ignored): {}", owner, e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioned_get() {
        let memories = PartitionedMemories {
            user: vec!["likes tea".to_string()],
            agent: vec![],
        };
        assert_eq!(memories.get(OwnerKind::User), ["likes tea".to_string()]);
        assert!(memories.get(OwnerKind::Agent).is_empty());
        assert!(!memories.is_empty());
        assert!(PartitionedMemories::default().is_empty());
    }
}
