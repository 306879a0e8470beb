//! Chain provider with multi-RPC support and automatic failover

use super::{ChainClient, LogQuery};
use crate::config::ChainConfig;
use crate::error::{MonitorError, MonitorResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &ChainConfig) -> MonitorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(MonitorError::Configuration(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            chain_id: config.chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    fn connection_error(&self, message: impl Into<String>) -> MonitorError {
        MonitorError::ChainConnection {
            chain_id: self.chain_id,
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> MonitorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => {
                    let block_num = block.as_u64();
                    crate::metrics::record_block_height(self.chain_id, block_num);
                    return Ok(block_num);
                }
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.connection_error("All providers failed"))
    }

    async fn get_logs(&self, query: &LogQuery) -> MonitorResult<Vec<Log>> {
        let mut filter = Filter::new()
            .address(query.address)
            .from_block(query.from_block)
            .to_block(query.to_block);
        if !query.events.is_empty() {
            filter = filter.topic0(ValueOrArray::Array(
                query.events.iter().copied().map(Some).collect(),
            ));
        }
        if let Some(topic) = query.topic3 {
            filter = filter.topic3(ValueOrArray::Value(Some(topic)));
        }

        for _ in 0..self.http_providers.len() {
            match self.http().get_logs(&filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!("Failed to get logs from chain {}: {}", self.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(self.connection_error("All providers failed to get logs"))
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> MonitorResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.connection_error(e.to_string()))
    }

    async fn block_timestamp(&self, block_number: u64) -> MonitorResult<u64> {
        let block = self
            .http()
            .get_block(block_number)
            .await
            .map_err(|e| self.connection_error(e.to_string()))?
            .ok_or_else(|| {
                MonitorError::NotFound(format!(
                    "block {} on chain {}",
                    block_number, self.chain_id
                ))
            })?;

        Ok(block.timestamp.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rpc_urls: Vec<&str>) -> ChainConfig {
        ChainConfig {
            chain_id: 901,
            name: "OP Devnet A".to_string(),
            rpc_urls: rpc_urls.into_iter().map(String::from).collect(),
            messenger_address: "0x4200000000000000000000000000000000000023".to_string(),
            inbox_address: String::new(),
            tokens: Default::default(),
            dex: None,
            enabled: true,
        }
    }

    #[test]
    fn test_rejects_config_without_valid_urls() {
        let err = ChainProvider::new(&config(vec!["not a url"])).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_failover_rotates_providers() {
        let provider =
            ChainProvider::new(&config(vec!["http://127.0.0.1:9545", "http://127.0.0.1:9546"]))
                .unwrap();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 1);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
        assert_eq!(ChainClient::chain_id(&provider), 901);
    }
}
