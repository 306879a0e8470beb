//! Execution provider interface
//!
//! Signing and submission live outside this crate. Workflows drive an
//! [`ExecutionProvider`] and hand the returned handles to the lifecycle
//! monitor. Implementations report reverts and submission failures as
//! [`MonitorError::Execution`](crate::error::MonitorError::Execution).

use crate::error::MonitorResult;
use crate::message::MessageHash;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// Handles returned for a submitted cross-chain call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainSubmission {
    /// Transaction on the source chain
    pub tx_hash: H256,
    /// Hash of the message emitted by that transaction
    pub message_hash: MessageHash,
}

/// Issues signed transactions on behalf of workflows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Call `target` on `chain_id`
    async fn submit_local(
        &self,
        chain_id: u64,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> MonitorResult<H256>;

    /// Send a message from `source_chain_id` calling `target` on `destination_chain_id`
    async fn submit_cross_chain(
        &self,
        source_chain_id: u64,
        destination_chain_id: u64,
        target: Address,
        data: Bytes,
    ) -> MonitorResult<CrossChainSubmission>;

    /// Bridge `amount` of `token` to `destination_chain_id`
    async fn submit_bridge(
        &self,
        source_chain_id: u64,
        destination_chain_id: u64,
        token: Address,
        amount: U256,
    ) -> MonitorResult<H256>;
}
