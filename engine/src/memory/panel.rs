//! Memory panel: a read-only view of both memory partitions.

use sdk::types::OwnerKind;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{MemoryGateway, PartitionedMemories};
use crate::session::SessionConfig;

pub struct MemoryPanel {
    gateway: Arc<dyn MemoryGateway>,
}

impl MemoryPanel {
    pub fn new(gateway: Arc<dyn MemoryGateway>) -> Self {
        Self { gateway }
    }

    /// Fetch the full memory set of both partitions.
    ///
    /// Skipped entirely (empty snapshot) when the memory key or the user
    /// identifier is missing. The two retrievals run concurrently and each
    /// failure degrades to an empty list for that partition.
    pub async fn refresh(&self, config: &SessionConfig) -> PartitionedMemories {
        if config.memory_api_key.is_empty() || config.user_id.trim().is_empty() {
            debug!("Memory panel refresh skipped: key or user id missing");
            return PartitionedMemories::default();
        }

        let key = &config.memory_api_key;
        let (user, agent) = futures::join!(
            self.retrieve_or_empty(OwnerKind::User, &config.user_id, key),
            self.retrieve_or_empty(OwnerKind::Agent, &config.agent_id, key),
        );

        PartitionedMemories { user, agent }
    }

    async fn retrieve_or_empty(
        &self,
        owner: OwnerKind,
        id: &str,
        key: &crate::secrets::SecretString,
    ) -> Vec<String> {
        match self.gateway.retrieve(owner, id, key).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!("Failed to retrieve {} memories: {}", owner, e);
                Vec::new()
            }
        }
    }
}
