//! In-memory chain used by unit tests

use super::{ChainClient, LogQuery};
use crate::error::{MonitorError, MonitorResult};

use async_trait::async_trait;
use ethers::types::{Log, TransactionReceipt, H256, U256, U64};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct ChainState {
    head: u64,
    logs: Vec<Log>,
    receipts: HashMap<H256, TransactionReceipt>,
    timestamps: HashMap<u64, u64>,
    failures_pending: u32,
    latency: Option<Duration>,
}

pub(crate) struct InMemoryChain {
    chain_id: u64,
    state: Mutex<ChainState>,
    log_queries: AtomicUsize,
}

impl InMemoryChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(ChainState::default()),
            log_queries: AtomicUsize::new(0),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn set_block_timestamp(&self, block_number: u64, timestamp: u64) {
        self.state
            .lock()
            .unwrap()
            .timestamps
            .insert(block_number, timestamp);
    }

    /// Make the next `count` RPC calls fail with a retryable error
    pub fn fail_next_calls(&self, count: u32) {
        self.state.lock().unwrap().failures_pending = count;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    pub fn log_queries(&self) -> usize {
        self.log_queries.load(Ordering::SeqCst)
    }

    /// Include `log` in `tx_hash` at `block_number`, returning the mined log
    pub fn emit(&self, tx_hash: H256, block_number: u64, log: Log) -> Log {
        let mut state = self.state.lock().unwrap();

        let log_index = state
            .logs
            .iter()
            .filter(|l| l.block_number == Some(U64::from(block_number)))
            .count();

        let mined = Log {
            block_number: Some(U64::from(block_number)),
            transaction_hash: Some(tx_hash),
            log_index: Some(U256::from(log_index)),
            ..log
        };

        state.logs.push(mined.clone());
        state.head = state.head.max(block_number);
        state
            .timestamps
            .entry(block_number)
            .or_insert_with(crate::message::unix_now);

        let receipt = state
            .receipts
            .entry(tx_hash)
            .or_insert_with(|| TransactionReceipt {
                transaction_hash: tx_hash,
                block_number: Some(U64::from(block_number)),
                status: Some(U64::from(1)),
                ..Default::default()
            });
        receipt.logs.push(mined.clone());

        mined
    }

    /// Record a mined transaction that emitted no logs
    pub fn add_empty_receipt(&self, tx_hash: H256, block_number: u64) {
        self.state.lock().unwrap().receipts.insert(
            tx_hash,
            TransactionReceipt {
                transaction_hash: tx_hash,
                block_number: Some(U64::from(block_number)),
                status: Some(U64::from(1)),
                ..Default::default()
            },
        );
    }

    async fn enter(&self) -> MonitorResult<()> {
        let latency = {
            let mut state = self.state.lock().unwrap();
            if state.failures_pending > 0 {
                state.failures_pending -= 1;
                return Err(MonitorError::ChainConnection {
                    chain_id: self.chain_id,
                    message: "injected failure".to_string(),
                });
            }
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for InMemoryChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> MonitorResult<u64> {
        self.enter().await?;
        Ok(self.state.lock().unwrap().head)
    }

    async fn get_logs(&self, query: &LogQuery) -> MonitorResult<Vec<Log>> {
        self.enter().await?;
        self.log_queries.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|l| query.matches(l))
            .cloned()
            .collect())
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> MonitorResult<Option<TransactionReceipt>> {
        self.enter().await?;
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn block_timestamp(&self, block_number: u64) -> MonitorResult<u64> {
        self.enter().await?;
        let mut state = self.state.lock().unwrap();
        Ok(*state
            .timestamps
            .entry(block_number)
            .or_insert_with(crate::message::unix_now))
    }
}
