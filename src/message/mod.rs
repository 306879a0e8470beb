//! Cross-chain message domain types
//!
//! A message is anchored to the exact log that emitted it on the source chain
//! ([`MessageIdentifier`]) and carries the decoded `SentMessage` fields
//! ([`OutboundMessage`]). The pair hashes to the [`MessageHash`] that the
//! destination chain's relay events are keyed on.

mod hash;

pub use hash::{compute_message_hash, payload_hash};

use crate::error::{MonitorError, MonitorResult};

use ethers::types::{Address, Bytes, Log, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation key between a source `SentMessage` and destination relay events
pub type MessageHash = H256;

/// Position of the emitting log on the source chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIdentifier {
    /// Contract that emitted the `SentMessage` log
    pub origin: Address,
    pub chain_id: u64,
    pub block_number: u64,
    pub log_index: u64,
    /// Timestamp of the block containing the log
    pub timestamp: u64,
}

impl MessageIdentifier {
    /// Build an identifier from a mined log and its block timestamp
    pub fn from_log(chain_id: u64, log: &Log, timestamp: u64) -> MonitorResult<Self> {
        let block_number = log
            .block_number
            .ok_or_else(|| MonitorError::Decode("log has no block number".to_string()))?
            .as_u64();

        let log_index = log
            .log_index
            .ok_or_else(|| MonitorError::Decode("log has no log index".to_string()))?;
        if log_index.bits() > 64 {
            return Err(MonitorError::Decode(format!(
                "log index {} out of range",
                log_index
            )));
        }

        Ok(Self {
            origin: log.address,
            chain_id,
            block_number,
            log_index: log_index.as_u64(),
            timestamp,
        })
    }
}

/// Fields of one `SentMessage` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Destination chain ID
    pub destination: u64,
    /// Contract called on the destination chain
    pub target: Address,
    pub nonce: U256,
    pub sender: Address,
    pub payload: Bytes,
}

/// Lifecycle state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Sent,
    Relayed,
    Failed,
    Expired,
}

impl MessageState {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageState::Sent)
    }

    /// The destination chain produced an outcome
    pub fn is_resolved(&self) -> bool {
        matches!(self, MessageState::Relayed | MessageState::Failed)
    }

    /// Transitions only move forward out of `Sent`
    pub fn can_transition_to(&self, next: MessageState) -> bool {
        matches!(self, MessageState::Sent) && next != MessageState::Sent
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Sent => "sent",
            MessageState::Relayed => "relayed",
            MessageState::Failed => "failed",
            MessageState::Expired => "expired",
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative view of one message, refreshed by the lifecycle monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatus {
    pub message_hash: MessageHash,
    pub identifier: MessageIdentifier,
    pub message: OutboundMessage,
    pub state: MessageState,
    pub source_tx_hash: H256,
    pub relay_tx_hash: Option<H256>,
    pub error: Option<String>,
    /// Unix seconds at which this state was last observed
    pub observed_at: u64,
}

impl MessageStatus {
    pub fn source_chain_id(&self) -> u64 {
        self.identifier.chain_id
    }

    pub fn destination_chain_id(&self) -> u64 {
        self.message.destination
    }

    /// Seconds elapsed since the message was sent
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.identifier.timestamp)
    }
}

/// Current unix time in seconds
pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
