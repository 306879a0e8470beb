//! Message resolution: source observation, destination probe, classification

use super::registry::{MessageRegistry, Recorded};
use crate::chain::{ChainClient, ChainClientPool, LogQuery};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::events::{decode_sent_message, topics, EventParser, MessengerEvent, RelayOutcome};
use crate::message::{
    compute_message_hash, unix_now, MessageHash, MessageIdentifier, MessageState, MessageStatus,
    OutboundMessage,
};

use dashmap::DashMap;
use ethers::types::{Log, H256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of scanning the destination chain for a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayProbe {
    /// No relay event yet
    Pending,
    Relayed { tx_hash: Option<H256> },
    Failed { tx_hash: Option<H256>, reason: String },
}

/// A `SentMessage` observed on its source chain
#[derive(Debug, Clone)]
pub struct SentObservation {
    pub identifier: MessageIdentifier,
    pub message: OutboundMessage,
    pub message_hash: MessageHash,
    pub source_tx_hash: H256,
}

impl SentObservation {
    pub fn new(identifier: MessageIdentifier, message: OutboundMessage, source_tx_hash: H256) -> Self {
        let message_hash = compute_message_hash(&identifier, &message);
        Self {
            identifier,
            message,
            message_hash,
            source_tx_hash,
        }
    }
}

impl From<&MessageStatus> for SentObservation {
    fn from(status: &MessageStatus) -> Self {
        Self {
            identifier: status.identifier,
            message: status.message.clone(),
            message_hash: status.message_hash,
            source_tx_hash: status.source_tx_hash,
        }
    }
}

/// Resolves messages against the chain pool and records them in the registry
pub struct MessageTracker {
    pool: Arc<ChainClientPool>,
    registry: Arc<MessageRegistry>,
    config: MonitorConfig,
    /// Destination block where each pending message's relay search begins
    search_starts: DashMap<MessageHash, u64>,
}

impl MessageTracker {
    pub fn new(pool: Arc<ChainClientPool>, registry: Arc<MessageRegistry>, config: MonitorConfig) -> Self {
        Self {
            pool,
            registry,
            config,
            search_starts: DashMap::new(),
        }
    }

    pub fn pool(&self) -> &ChainClientPool {
        &self.pool
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Locate, decode and probe the first `SentMessage` of a source transaction
    pub async fn resolve_transaction(&self, chain_id: u64, tx_hash: H256) -> MonitorResult<Recorded> {
        let client = self.pool.client(chain_id)?;
        let endpoint = self.pool.endpoint(chain_id)?;

        let receipt = client.get_transaction_receipt(tx_hash).await?.ok_or_else(|| {
            MonitorError::NotFound(format!(
                "receipt for tx {:?} on chain {}",
                tx_hash, chain_id
            ))
        })?;

        let parser = EventParser::new(endpoint.messenger);
        let log = receipt
            .logs
            .iter()
            .find(|l| parser.is_sent_message(l))
            .ok_or_else(|| {
                MonitorError::NotFound(format!(
                    "no SentMessage event in tx {:?} on chain {}",
                    tx_hash, chain_id
                ))
            })?;

        let mut timestamps = HashMap::new();
        let observation = self
            .observe(chain_id, client.as_ref(), log, &mut timestamps)
            .await?;

        self.refresh(observation).await
    }

    /// Decode a `SentMessage` log and anchor it to its block.
    ///
    /// `timestamps` caches block timestamps across logs of one scan.
    pub async fn observe(
        &self,
        chain_id: u64,
        client: &dyn ChainClient,
        log: &Log,
        timestamps: &mut HashMap<u64, u64>,
    ) -> MonitorResult<SentObservation> {
        let message = decode_sent_message(log)?;

        let block_number = log
            .block_number
            .ok_or_else(|| MonitorError::Decode("SentMessage log is not mined".to_string()))?
            .as_u64();

        let timestamp = match timestamps.get(&block_number) {
            Some(ts) => *ts,
            None => {
                let ts = client.block_timestamp(block_number).await?;
                timestamps.insert(block_number, ts);
                ts
            }
        };

        let identifier = MessageIdentifier::from_log(chain_id, log, timestamp)?;
        let source_tx_hash = log.transaction_hash.unwrap_or_default();

        Ok(SentObservation::new(identifier, message, source_tx_hash))
    }

    /// Probe the destination, classify and record the observation
    pub async fn refresh(&self, observation: SentObservation) -> MonitorResult<Recorded> {
        let probe = self
            .probe_relay(
                observation.message_hash,
                observation.message.destination,
                Some(observation.identifier.timestamp),
            )
            .await?;

        let status = classify(observation, probe, unix_now(), self.config.message_expiry_secs);
        if status.state.is_terminal() {
            self.search_starts.remove(&status.message_hash);
        }
        Ok(self.registry.record(status).await)
    }

    /// Search the destination messenger's full history for the relay outcome
    pub async fn check_relay_status(
        &self,
        message_hash: MessageHash,
        destination_chain_id: u64,
    ) -> MonitorResult<RelayProbe> {
        self.probe_relay(message_hash, destination_chain_id, None).await
    }

    /// Query relay events carrying `message_hash` as topic3.
    ///
    /// With a send time the search starts `relay_lookback_blocks` below the
    /// first destination block produced at or after that time.
    async fn probe_relay(
        &self,
        message_hash: MessageHash,
        destination_chain_id: u64,
        sent_at: Option<u64>,
    ) -> MonitorResult<RelayProbe> {
        let client = self.pool.client(destination_chain_id)?;
        let endpoint = self.pool.endpoint(destination_chain_id)?;

        let head = client.block_number().await?;
        let from_block = match sent_at {
            Some(timestamp) => {
                self.search_start(client.as_ref(), message_hash, timestamp, head)
                    .await?
            }
            None => 0,
        };

        let query = LogQuery::new(endpoint.messenger, from_block, head)
            .events(vec![*topics::RELAYED_MESSAGE, *topics::FAILED_RELAYED_MESSAGE])
            .topic3(message_hash);
        let logs = client.get_logs(&query).await?;

        let parser = EventParser::new(endpoint.messenger);
        let mut failed = None;

        for log in &logs {
            let receipt = match parser.parse_log(log) {
                Ok(Some(MessengerEvent::Relay(receipt))) => receipt,
                Ok(_) => continue,
                Err(e) => {
                    debug!(
                        "Skipping undecodable log on chain {}: {}",
                        destination_chain_id, e
                    );
                    continue;
                }
            };

            if receipt.message_hash != message_hash {
                continue;
            }

            match receipt.outcome {
                RelayOutcome::Relayed => {
                    return Ok(RelayProbe::Relayed {
                        tx_hash: receipt.tx_hash,
                    });
                }
                RelayOutcome::Failed if failed.is_none() => {
                    failed = Some(receipt);
                }
                RelayOutcome::Failed => {}
            }
        }

        Ok(match failed {
            Some(receipt) => RelayProbe::Failed {
                tx_hash: receipt.tx_hash,
                reason: format!(
                    "relay of message {:?} failed on chain {} (tx {:?})",
                    message_hash,
                    destination_chain_id,
                    receipt.tx_hash.unwrap_or_default()
                ),
            },
            None => RelayProbe::Pending,
        })
    }

    /// First destination block of the relay search, cached per message
    async fn search_start(
        &self,
        client: &dyn ChainClient,
        message_hash: MessageHash,
        sent_at: u64,
        head: u64,
    ) -> MonitorResult<u64> {
        if let Some(block) = self.search_starts.get(&message_hash) {
            return Ok(*block);
        }

        let anchor = first_block_at_or_after(client, sent_at, head).await?;
        let start = anchor.saturating_sub(self.config.relay_lookback_blocks);
        self.search_starts.insert(message_hash, start);
        Ok(start)
    }
}

/// Lowest block in `[0, head]` whose timestamp is at least `timestamp`.
///
/// Returns `head` when every block is older.
pub async fn first_block_at_or_after(
    client: &dyn ChainClient,
    timestamp: u64,
    head: u64,
) -> MonitorResult<u64> {
    let (mut low, mut high) = (0u64, head);
    while low < high {
        let mid = low + (high - low) / 2;
        if client.block_timestamp(mid).await? >= timestamp {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    Ok(low)
}

/// Turn an observation and probe result into a status.
///
/// Unresolved messages older than `expiry_secs` (0 disables) are expired.
pub fn classify(
    observation: SentObservation,
    probe: RelayProbe,
    now: u64,
    expiry_secs: u64,
) -> MessageStatus {
    let (state, relay_tx_hash, error) = match probe {
        RelayProbe::Relayed { tx_hash } => (MessageState::Relayed, tx_hash, None),
        RelayProbe::Failed { tx_hash, reason } => (MessageState::Failed, tx_hash, Some(reason)),
        RelayProbe::Pending => {
            let age = now.saturating_sub(observation.identifier.timestamp);
            if expiry_secs > 0 && age >= expiry_secs {
                (MessageState::Expired, None, None)
            } else {
                (MessageState::Sent, None, None)
            }
        }
    };

    MessageStatus {
        message_hash: observation.message_hash,
        identifier: observation.identifier,
        message: observation.message,
        state,
        source_tx_hash: observation.source_tx_hash,
        relay_tx_hash,
        error,
        observed_at: now,
    }
}
