//! Chain module - read-only access to every configured chain
//!
//! This module provides:
//! - The [`ChainClient`] trait consumed by the lifecycle monitor
//! - An ethers-backed [`ChainProvider`] with multi-RPC failover
//! - The [`ChainClientPool`] holding one client per chain ID

pub mod provider;

#[cfg(test)]
pub(crate) mod memory;

pub use provider::ChainProvider;

use crate::config::{ChainConfig, Settings};
use crate::error::{MonitorError, MonitorResult};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{Address, Log, TransactionReceipt, H256};
use std::sync::Arc;
use tracing::{info, warn};

/// Read-only connection to one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Current block height
    async fn block_number(&self) -> MonitorResult<u64>;

    /// Logs matching `query`
    async fn get_logs(&self, query: &LogQuery) -> MonitorResult<Vec<Log>>;

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> MonitorResult<Option<TransactionReceipt>>;

    async fn block_timestamp(&self, block_number: u64) -> MonitorResult<u64>;
}

/// Log filter over an inclusive block range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub from_block: u64,
    pub to_block: u64,
    /// Accepted event signatures; empty matches any
    pub events: Vec<H256>,
    /// Required value of the fourth topic
    pub topic3: Option<H256>,
}

impl LogQuery {
    pub fn new(address: Address, from_block: u64, to_block: u64) -> Self {
        Self {
            address,
            from_block,
            to_block,
            events: Vec::new(),
            topic3: None,
        }
    }

    pub fn events(mut self, events: Vec<H256>) -> Self {
        self.events = events;
        self
    }

    pub fn topic3(mut self, topic: H256) -> Self {
        self.topic3 = Some(topic);
        self
    }

    /// Whether `log` satisfies every condition of the query
    pub fn matches(&self, log: &Log) -> bool {
        let block = log.block_number.map(|b| b.as_u64()).unwrap_or_default();
        log.address == self.address
            && block >= self.from_block
            && block <= self.to_block
            && (self.events.is_empty()
                || log.topics.first().map_or(false, |t| self.events.contains(t)))
            && self
                .topic3
                .map_or(true, |topic| log.topics.get(3) == Some(&topic))
    }
}

/// Contract addresses of one configured chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub chain_id: u64,
    pub name: String,
    pub messenger: Address,
    pub inbox: Option<Address>,
}

impl ChainEndpoint {
    pub fn from_config(config: &ChainConfig) -> MonitorResult<Self> {
        let messenger = parse_address(&config.messenger_address, "messenger", config.chain_id)?;
        let inbox = if config.inbox_address.is_empty() {
            None
        } else {
            Some(parse_address(&config.inbox_address, "inbox", config.chain_id)?)
        };

        Ok(Self {
            chain_id: config.chain_id,
            name: config.name.clone(),
            messenger,
            inbox,
        })
    }
}

fn parse_address(value: &str, field: &str, chain_id: u64) -> MonitorResult<Address> {
    value.parse().map_err(|e| {
        MonitorError::Configuration(format!(
            "Invalid {} address {:?} for chain {}: {}",
            field, value, chain_id, e
        ))
    })
}

struct PoolEntry {
    endpoint: ChainEndpoint,
    client: Arc<dyn ChainClient>,
}

/// One read client per configured chain
#[derive(Default)]
pub struct ChainClientPool {
    entries: DashMap<u64, PoolEntry>,
}

impl ChainClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create HTTP providers for all enabled chains
    pub async fn connect(settings: &Settings) -> MonitorResult<Self> {
        let pool = Self::new();

        for (name, chain_config) in settings.enabled_chains() {
            info!(
                "Initializing chain {} (ID: {})",
                name, chain_config.chain_id
            );

            let endpoint = ChainEndpoint::from_config(chain_config)?;
            let provider = ChainProvider::new(chain_config)?;
            pool.register(endpoint, Arc::new(provider));
        }

        Ok(pool)
    }

    /// Add or replace the client for a chain
    pub fn register(&self, endpoint: ChainEndpoint, client: Arc<dyn ChainClient>) {
        if client.chain_id() != endpoint.chain_id {
            warn!(
                "Client reports chain {} but is registered for chain {}",
                client.chain_id(),
                endpoint.chain_id
            );
        }
        self.entries
            .insert(endpoint.chain_id, PoolEntry { endpoint, client });
    }

    pub fn client(&self, chain_id: u64) -> MonitorResult<Arc<dyn ChainClient>> {
        self.entries
            .get(&chain_id)
            .map(|e| e.client.clone())
            .ok_or(MonitorError::ChainNotConfigured { chain_id })
    }

    pub fn endpoint(&self, chain_id: u64) -> MonitorResult<ChainEndpoint> {
        self.entries
            .get(&chain_id)
            .map(|e| e.endpoint.clone())
            .ok_or(MonitorError::ChainNotConfigured { chain_id })
    }

    /// Configured chain IDs in ascending order
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let clients: Vec<(u64, Arc<dyn ChainClient>)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.client.clone()))
            .collect();

        let mut results = Vec::new();
        for (chain_id, client) in clients {
            let healthy = match client.block_number().await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Health check failed for chain {}: {}", chain_id, e);
                    false
                }
            };
            crate::metrics::record_chain_health(chain_id, healthy);
            results.push((chain_id, healthy));
        }

        results
    }
}
