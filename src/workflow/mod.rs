//! Workflow module - multi-chain swap -> bridge -> swap orchestration
//!
//! A workflow is a fixed sequence of dependent operations. Each step is
//! submitted through an [`ExecutionProvider`](crate::execution::ExecutionProvider)
//! only after the previous one succeeded; the cross-chain leg is then tracked
//! through the [`LifecycleMonitor`](crate::monitor::LifecycleMonitor).

pub mod dex;
pub mod orchestrator;
pub mod routing;

pub use dex::{encode_swap, RouterType, SwapRequest};
pub use orchestrator::WorkflowOrchestrator;
pub use routing::RouteBook;

use crate::error::MonitorError;
use crate::message::MessageHash;

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Swap,
    Bridge,
    CrossChainSwap,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Swap => "swap",
            OperationKind::Bridge => "bridge",
            OperationKind::CrossChainSwap => "cross-chain-swap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        matches!(self, OperationStatus::Pending) && next != OperationStatus::Pending
    }
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOperation {
    pub kind: OperationKind,
    /// Chain the step was submitted on
    pub chain_id: u64,
    pub tx_hash: Option<H256>,
    pub message_hash: Option<MessageHash>,
    pub status: OperationStatus,
}

impl WorkflowOperation {
    pub fn completed(kind: OperationKind, chain_id: u64, tx_hash: H256) -> Self {
        Self {
            kind,
            chain_id,
            tx_hash: Some(tx_hash),
            message_hash: None,
            status: OperationStatus::Completed,
        }
    }

    pub fn failed(kind: OperationKind, chain_id: u64) -> Self {
        Self {
            kind,
            chain_id,
            tx_hash: None,
            message_hash: None,
            status: OperationStatus::Failed,
        }
    }

    /// Move forward to `next`; returns false if the transition is not allowed
    pub fn transition(&mut self, next: OperationStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Record of one swap -> bridge -> swap execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub id: Uuid,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub operations: Vec<WorkflowOperation>,
    pub source_swap_tx: Option<H256>,
    pub bridge_tx: Option<H256>,
    pub destination_message_hash: Option<MessageHash>,
    pub estimated_completion_secs: u64,
    pub started_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub fn new(source_chain_id: u64, destination_chain_id: u64, estimated_completion_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_chain_id,
            destination_chain_id,
            operations: Vec::new(),
            source_swap_tx: None,
            bridge_tx: None,
            destination_message_hash: None,
            estimated_completion_secs,
            started_at: Utc::now(),
        }
    }

    pub fn push(&mut self, operation: WorkflowOperation) {
        self.operations.push(operation);
    }

    pub fn completed_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Completed)
            .count()
    }

    pub fn has_failed(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.status == OperationStatus::Failed)
    }

    /// The operation carrying the tracked cross-chain message
    pub fn tracked_message(&self) -> Option<&WorkflowOperation> {
        self.operations.iter().find(|op| op.message_hash.is_some())
    }

    /// Settle the tracked operation; returns false if it was already settled
    pub fn resolve_message(&mut self, status: OperationStatus) -> bool {
        self.operations
            .iter_mut()
            .find(|op| op.message_hash.is_some())
            .map(|op| op.transition(status))
            .unwrap_or(false)
    }
}

/// Inputs of a swap -> bridge -> swap workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapBridgeSwapParams {
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    /// Token sold on the source chain
    pub token_in: String,
    /// Token bought on the source chain and bridged
    pub bridge_token: String,
    /// Token bought on the destination chain
    pub token_out: String,
    pub amount_in: U256,
    /// Minimum source swap output, also the amount bridged
    pub min_bridge_amount: U256,
    pub min_amount_out: U256,
    /// Account holding the funds between steps
    pub account: Address,
    /// Receiver of the destination swap output
    pub recipient: Address,
}

/// A halted workflow with the operations recorded up to the failing step
#[derive(Debug, Error)]
#[error("Workflow {} halted: {error}", .partial.id)]
pub struct WorkflowFailure {
    pub partial: WorkflowResult,
    #[source]
    pub error: MonitorError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_status_forward_only() {
        let mut op = WorkflowOperation {
            kind: OperationKind::CrossChainSwap,
            chain_id: 901,
            tx_hash: Some(H256::repeat_byte(1)),
            message_hash: Some(H256::repeat_byte(2)),
            status: OperationStatus::Pending,
        };

        assert!(op.transition(OperationStatus::Completed));
        assert!(!op.transition(OperationStatus::Failed));
        assert!(!op.transition(OperationStatus::Pending));
        assert_eq!(op.status, OperationStatus::Completed);
    }

    #[test]
    fn test_result_tracks_message_operation() {
        let mut result = WorkflowResult::new(901, 902, 120);
        result.push(WorkflowOperation::completed(
            OperationKind::Swap,
            901,
            H256::repeat_byte(1),
        ));
        assert!(result.tracked_message().is_none());
        assert!(!result.resolve_message(OperationStatus::Completed));

        result.push(WorkflowOperation {
            kind: OperationKind::CrossChainSwap,
            chain_id: 901,
            tx_hash: Some(H256::repeat_byte(3)),
            message_hash: Some(H256::repeat_byte(4)),
            status: OperationStatus::Pending,
        });
        assert_eq!(result.completed_count(), 1);
        assert!(result.resolve_message(OperationStatus::Failed));
        assert!(result.has_failed());
        assert!(!result.resolve_message(OperationStatus::Completed));
    }

    #[test]
    fn test_result_serializes_kinds_in_kebab_case() {
        let mut result = WorkflowResult::new(901, 902, 120);
        result.push(WorkflowOperation::failed(OperationKind::CrossChainSwap, 901));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["operations"][0]["kind"], "cross-chain-swap");
        assert_eq!(json["operations"][0]["status"], "failed");
        assert_eq!(json["estimated_completion_secs"], 120);
    }
}
