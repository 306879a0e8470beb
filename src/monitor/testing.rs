//! Two-chain fixture shared by monitor and workflow tests

use crate::chain::memory::InMemoryChain;
use crate::chain::{ChainClient, ChainClientPool, ChainEndpoint};
use crate::config::MonitorConfig;
use crate::events::{encode_relay_log, encode_sent_message_log, RelayOutcome};
use crate::message::{compute_message_hash, MessageHash, MessageIdentifier, OutboundMessage};

use ethers::types::{Address, Bytes, Log, H256, U256};
use std::sync::Arc;

pub(crate) const SOURCE: u64 = 901;
pub(crate) const DESTINATION: u64 = 902;
pub(crate) const THIRD: u64 = 903;

pub(crate) fn messenger() -> Address {
    "0x4200000000000000000000000000000000000023"
        .parse()
        .unwrap()
}

pub(crate) fn fast_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_ms: 20,
        relay_poll_interval_ms: 20,
        trailing_window_blocks: 10,
        relay_lookback_blocks: 1_000,
        probe_timeout_ms: 200,
        message_expiry_secs: 3_600,
        status_channel_capacity: 64,
        backoff_base_ms: 200,
        backoff_max_ms: 1_000,
    }
}

pub(crate) struct SentFixture {
    pub log: Log,
    pub message: OutboundMessage,
    pub hash: MessageHash,
}

pub(crate) struct Harness {
    pub source: Arc<InMemoryChain>,
    pub destination: Arc<InMemoryChain>,
    pub pool: Arc<ChainClientPool>,
}

impl Harness {
    pub fn new() -> Self {
        let source = Arc::new(InMemoryChain::new(SOURCE));
        let destination = Arc::new(InMemoryChain::new(DESTINATION));

        let harness = Self {
            source: source.clone(),
            destination: destination.clone(),
            pool: Arc::new(ChainClientPool::new()),
        };
        harness.register(source);
        harness.register(destination);
        harness
    }

    /// Register one more chain sharing the messenger address
    pub fn add_chain(&self, chain_id: u64) -> Arc<InMemoryChain> {
        let chain = Arc::new(InMemoryChain::new(chain_id));
        self.register(chain.clone());
        chain
    }

    fn register(&self, chain: Arc<InMemoryChain>) {
        let chain_id = chain.chain_id();
        self.pool.register(
            ChainEndpoint {
                chain_id,
                name: format!("devnet-{}", chain_id),
                messenger: messenger(),
                inbox: None,
            },
            chain,
        );
    }

    /// Emit a `SentMessage` to the destination chain at `block`
    pub fn send(&self, tx_hash: H256, block: u64, nonce: u64, timestamp: u64) -> SentFixture {
        self.send_to(DESTINATION, tx_hash, block, nonce, timestamp)
    }

    /// Emit a `SentMessage` to `destination` at `block`
    pub fn send_to(
        &self,
        destination: u64,
        tx_hash: H256,
        block: u64,
        nonce: u64,
        timestamp: u64,
    ) -> SentFixture {
        let message = OutboundMessage {
            destination,
            target: Address::repeat_byte(0x11),
            nonce: U256::from(nonce),
            sender: Address::repeat_byte(0x22),
            payload: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        };

        self.source.set_block_timestamp(block, timestamp);
        let log = self
            .source
            .emit(tx_hash, block, encode_sent_message_log(messenger(), &message));

        let identifier = MessageIdentifier::from_log(SOURCE, &log, timestamp).unwrap();
        let hash = compute_message_hash(&identifier, &message);

        SentFixture { log, message, hash }
    }

    /// Emit a relay event for `sent` on the destination chain
    pub fn relay(&self, sent: &SentFixture, tx_hash: H256, block: u64, outcome: RelayOutcome) {
        relay_on(&self.destination, sent, tx_hash, block, outcome);
    }
}

/// Emit a relay event for `sent` on `chain`
pub(crate) fn relay_on(
    chain: &InMemoryChain,
    sent: &SentFixture,
    tx_hash: H256,
    block: u64,
    outcome: RelayOutcome,
) {
    chain.emit(
        tx_hash,
        block,
        encode_relay_log(messenger(), outcome, SOURCE, sent.message.nonce, sent.hash),
    );
}
