//! Lifecycle monitor - tracks cross-chain messages from send to relay
//!
//! This module provides:
//! - On-demand resolution of a source transaction to its [`MessageStatus`]
//! - Per-chain background polling with dedup, expiry and backoff
//! - Status notifications over a bounded broadcast channel (drop-oldest)

pub mod backoff;
pub mod poller;
pub mod registry;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use poller::ChainPoller;
pub use registry::{MessageRegistry, Recorded};
pub use tracker::{MessageTracker, RelayProbe, SentObservation};

use crate::chain::ChainClientPool;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::message::{MessageHash, MessageStatus};

use ethers::types::H256;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tasks of one `start_monitoring` call
struct MonitoringSession {
    active: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl MonitoringSession {
    fn shutdown(self) {
        self.active.store(false, Ordering::SeqCst);
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Observes messages across every chain in the pool.
///
/// Each monitor owns its registry and timers; monitors share nothing.
pub struct LifecycleMonitor {
    tracker: Arc<MessageTracker>,
    config: MonitorConfig,
    status_tx: broadcast::Sender<MessageStatus>,
    session: Mutex<Option<MonitoringSession>>,
}

impl LifecycleMonitor {
    pub fn new(pool: Arc<ChainClientPool>, config: MonitorConfig) -> Self {
        let (status_tx, _) = broadcast::channel(config.status_channel_capacity.max(1));
        let registry = Arc::new(MessageRegistry::new());
        let tracker = Arc::new(MessageTracker::new(pool, registry, config.clone()));

        Self {
            tracker,
            config,
            status_tx,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn pool(&self) -> &ChainClientPool {
        self.tracker.pool()
    }

    /// Resolve the message sent by `tx_hash` on `source_chain_id`
    pub async fn monitor_message(
        &self,
        source_chain_id: u64,
        tx_hash: H256,
    ) -> MonitorResult<MessageStatus> {
        let recorded = self
            .tracker
            .resolve_transaction(source_chain_id, tx_hash)
            .await?;

        if recorded.changed {
            self.publish(&recorded.status);
        }

        Ok(recorded.status)
    }

    pub async fn check_relay_status(
        &self,
        message_hash: MessageHash,
        destination_chain_id: u64,
    ) -> MonitorResult<RelayProbe> {
        self.tracker
            .check_relay_status(message_hash, destination_chain_id)
            .await
    }

    /// Resolve many transactions concurrently, dropping the ones that fail
    pub async fn get_messages_status(&self, requests: &[(u64, H256)]) -> Vec<MessageStatus> {
        let lookups = requests
            .iter()
            .map(|(chain_id, tx_hash)| self.monitor_message(*chain_id, *tx_hash));

        join_all(lookups)
            .await
            .into_iter()
            .zip(requests)
            .filter_map(|(result, (chain_id, tx_hash))| match result {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(
                        "Failed to resolve tx {:?} on chain {}: {}",
                        tx_hash, chain_id, e
                    );
                    None
                }
            })
            .collect()
    }

    /// Poll until the message reaches a terminal state or `timeout` elapses.
    ///
    /// Unmined transactions and RPC failures keep polling.
    pub async fn wait_for_relay(
        &self,
        source_chain_id: u64,
        tx_hash: H256,
        timeout: Duration,
    ) -> MonitorResult<MessageStatus> {
        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(self.config.relay_poll_interval_ms.max(1));
        let timed_out = || MonitorError::Timeout {
            operation: format!("relay of tx {:?} on chain {}", tx_hash, source_chain_id),
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            match tokio::time::timeout(remaining, self.monitor_message(source_chain_id, tx_hash))
                .await
            {
                Ok(Ok(status)) if status.state.is_terminal() => return Ok(status),
                Ok(Ok(status)) => {
                    debug!("Message {:?} still {}", status.message_hash, status.state);
                }
                Ok(Err(e)) if e.is_retryable() || matches!(e, MonitorError::NotFound(_)) => {
                    debug!("Waiting for tx {:?}: {}", tx_hash, e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(timed_out()),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }
    }

    /// Start one poller per chain plus a dispatcher feeding `callback`.
    ///
    /// Returns `false` if monitoring is already running.
    pub async fn start_monitoring<F>(&self, callback: F) -> bool
    where
        F: Fn(MessageStatus) + Send + Sync + 'static,
    {
        let mut session = self.session.lock().await;
        if session.is_some() {
            debug!("Monitoring already running");
            return false;
        }

        let active = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::new();

        handles.push(tokio::spawn(dispatch(
            self.status_tx.subscribe(),
            callback,
            active.clone(),
        )));

        let chain_ids = self.pool().chain_ids();
        for chain_id in &chain_ids {
            let poller = Arc::new(ChainPoller::new(
                *chain_id,
                self.tracker.clone(),
                self.status_tx.clone(),
                active.clone(),
            ));
            handles.push(tokio::spawn(poller.run()));
        }

        info!("Started monitoring chains {:?}", chain_ids);
        *session = Some(MonitoringSession { active, handles });
        true
    }

    /// Stop all pollers and the dispatcher; results of in-flight ticks are dropped
    pub async fn stop_monitoring(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown();
            info!("Stopped monitoring");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Receive every published status change
    pub fn subscribe(&self) -> broadcast::Receiver<MessageStatus> {
        self.status_tx.subscribe()
    }

    pub async fn tracked_statuses(&self) -> Vec<MessageStatus> {
        self.tracker.registry().snapshot().await
    }

    pub async fn status_of(&self, message_hash: &MessageHash) -> Option<MessageStatus> {
        self.tracker.registry().get(message_hash).await
    }

    fn publish(&self, status: &MessageStatus) {
        crate::metrics::record_message_state(status.source_chain_id(), status.state);
        let _ = self.status_tx.send(status.clone());
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown();
        }
    }
}

/// Deliver broadcast statuses to the callback; lagged statuses are dropped
async fn dispatch<F>(
    mut rx: broadcast::Receiver<MessageStatus>,
    callback: F,
    active: Arc<AtomicBool>,
) where
    F: Fn(MessageStatus) + Send + Sync + 'static,
{
    loop {
        match rx.recv().await {
            Ok(status) => {
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                callback(status);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Status subscriber lagged, dropped {} notifications", skipped);
                crate::metrics::record_dropped_notifications(skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
