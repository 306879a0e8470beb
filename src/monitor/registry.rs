//! Known-message registry with forward-only state transitions

use crate::message::{MessageHash, MessageState, MessageStatus};

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of recording an observation
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Status held by the registry after the update
    pub status: MessageStatus,
    /// Whether (hash, state) is new to the registry
    pub changed: bool,
}

/// All messages observed by one monitor
#[derive(Default)]
pub struct MessageRegistry {
    statuses: RwLock<HashMap<MessageHash, MessageStatus>>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fresh observation into the registry.
    ///
    /// Observations that would move a message out of a terminal state are
    /// ignored; the stored status is returned instead.
    pub async fn record(&self, status: MessageStatus) -> Recorded {
        let mut statuses = self.statuses.write().await;

        let Some(existing) = statuses.get_mut(&status.message_hash) else {
            statuses.insert(status.message_hash, status.clone());
            return Recorded {
                status,
                changed: true,
            };
        };

        if existing.state == status.state {
            existing.observed_at = existing.observed_at.max(status.observed_at);
            return Recorded {
                status: existing.clone(),
                changed: false,
            };
        }

        if existing.state.can_transition_to(status.state) {
            debug!(
                "Message {:?}: {} -> {}",
                status.message_hash, existing.state, status.state
            );
            *existing = status.clone();
            return Recorded {
                status,
                changed: true,
            };
        }

        debug!(
            "Ignoring {} observation for message {:?} already {}",
            status.state, status.message_hash, existing.state
        );
        Recorded {
            status: existing.clone(),
            changed: false,
        }
    }

    pub async fn get(&self, hash: &MessageHash) -> Option<MessageStatus> {
        self.statuses.read().await.get(hash).cloned()
    }

    pub async fn is_terminal(&self, hash: &MessageHash) -> bool {
        self.statuses
            .read()
            .await
            .get(hash)
            .map(|s| s.state.is_terminal())
            .unwrap_or(false)
    }

    /// Unresolved messages sent from `chain_id`
    pub async fn pending_for_chain(&self, chain_id: u64) -> Vec<MessageStatus> {
        self.statuses
            .read()
            .await
            .values()
            .filter(|s| s.state == MessageState::Sent && s.identifier.chain_id == chain_id)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> Vec<MessageStatus> {
        self.statuses.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.statuses.read().await.len()
    }
}
