//! Per-chain poll loop over the messenger's trailing block window

use super::backoff::Backoff;
use super::tracker::{MessageTracker, SentObservation};
use crate::chain::LogQuery;
use crate::error::MonitorResult;
use crate::events::{topics, EventParser};
use crate::message::{MessageHash, MessageStatus};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const MAX_CONCURRENT_PROBES: usize = 16;

/// Polls one source chain for sent messages and refreshes their status
pub struct ChainPoller {
    chain_id: u64,
    tracker: Arc<MessageTracker>,
    status_tx: broadcast::Sender<MessageStatus>,
    /// Cleared when the owning monitoring session stops
    active: Arc<AtomicBool>,
    in_flight: AtomicBool,
    /// Source chain reads
    backoff: Mutex<Backoff>,
    /// Destination probes, keyed by destination chain
    destinations: Mutex<HashMap<u64, Backoff>>,
    poll_interval: Duration,
    probe_timeout: Duration,
}

/// Clears the in-flight flag when a tick finishes or is cancelled
struct TickGuard(Arc<ChainPoller>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

impl ChainPoller {
    pub fn new(
        chain_id: u64,
        tracker: Arc<MessageTracker>,
        status_tx: broadcast::Sender<MessageStatus>,
        active: Arc<AtomicBool>,
    ) -> Self {
        let config = tracker.config();
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        let probe_timeout = Duration::from_millis(config.probe_timeout_ms.max(1));
        let backoff = Backoff::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        );

        Self {
            chain_id,
            tracker,
            status_tx,
            active,
            in_flight: AtomicBool::new(false),
            backoff: Mutex::new(backoff),
            destinations: Mutex::new(HashMap::new()),
            poll_interval,
            probe_timeout,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Tick until the session is deactivated.
    ///
    /// Each tick runs on its own task so a slow RPC never delays the timer.
    pub async fn run(self: Arc<Self>) {
        info!(
            "Polling chain {} every {:?}",
            self.chain_id, self.poll_interval
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if !self.active.load(Ordering::SeqCst) {
                break;
            }

            if !self.backoff.lock().await.ready(Instant::now()) {
                debug!("Chain {}: in backoff, skipping tick", self.chain_id);
                continue;
            }

            let Some(guard) = self.begin_tick() else {
                debug!("Chain {}: previous tick still running", self.chain_id);
                continue;
            };

            tokio::spawn(async move {
                guard.0.tick().await;
            });
        }

        debug!("Chain {} poller stopped", self.chain_id);
    }

    fn begin_tick(self: &Arc<Self>) -> Option<TickGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| TickGuard(self.clone()))
    }

    /// Run one scan and update the backoff state
    pub async fn tick(&self) {
        match self.scan().await {
            Ok(()) => self.backoff.lock().await.record_success(),
            Err(e) => {
                crate::metrics::record_poll_error(self.chain_id);
                let delay = self.backoff.lock().await.record_failure(Instant::now());
                warn!(
                    "Chain {}: poll failed, backing off for {:?}: {}",
                    self.chain_id, delay, e
                );
            }
        }
    }

    /// Scan the source window and refresh every pending message.
    ///
    /// Only reads of the source chain fail the tick. Destination failures
    /// pause probes to that destination and leave other messages unaffected.
    async fn scan(&self) -> MonitorResult<()> {
        let pool = self.tracker.pool();
        let client = pool.client(self.chain_id)?;
        let endpoint = pool.endpoint(self.chain_id)?;

        let head = client.block_number().await?;
        let window = self.tracker.config().trailing_window_blocks.max(1);
        let from_block = head.saturating_sub(window - 1);

        let query = LogQuery::new(endpoint.messenger, from_block, head)
            .events(vec![*topics::SENT_MESSAGE]);
        let logs = client.get_logs(&query).await?;
        debug!(
            "Chain {}: blocks {} to {}, {} messenger logs",
            self.chain_id,
            from_block,
            head,
            logs.len()
        );

        let parser = EventParser::new(endpoint.messenger);
        let mut timestamps = HashMap::new();
        let mut covered: HashSet<MessageHash> = HashSet::new();
        let mut due = Vec::new();

        for log in logs.iter().filter(|l| parser.is_sent_message(l)) {
            let observation = match self
                .tracker
                .observe(self.chain_id, client.as_ref(), log, &mut timestamps)
                .await
            {
                Ok(observation) => observation,
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        "Chain {}: skipping log {:?}/{:?}: {}",
                        self.chain_id, log.transaction_hash, log.log_index, e
                    );
                    crate::metrics::record_decode_error(self.chain_id);
                    continue;
                }
            };

            covered.insert(observation.message_hash);
            if self
                .tracker
                .registry()
                .is_terminal(&observation.message_hash)
                .await
            {
                continue;
            }
            due.push(observation);
        }

        // Messages that left the window still need their relay reported
        for status in self.tracker.registry().pending_for_chain(self.chain_id).await {
            if !covered.contains(&status.message_hash) {
                due.push(SentObservation::from(&status));
            }
        }

        stream::iter(due)
            .for_each_concurrent(MAX_CONCURRENT_PROBES, |observation| self.refresh(observation))
            .await;

        Ok(())
    }

    async fn refresh(&self, observation: SentObservation) {
        let hash = observation.message_hash;
        let destination = observation.message.destination;

        if !self.destination_ready(destination).await {
            debug!(
                "Chain {}: destination {} in backoff, message {:?} deferred",
                self.chain_id, destination, hash
            );
            return;
        }

        match timeout(self.probe_timeout, self.tracker.refresh(observation)).await {
            Ok(Ok(recorded)) => {
                self.destination_succeeded(destination).await;
                if recorded.changed {
                    self.publish(recorded.status);
                }
            }
            Ok(Err(e)) if e.is_retryable() => {
                self.destination_failed(destination, &e.to_string()).await;
            }
            Ok(Err(e)) => {
                warn!(
                    "Chain {}: cannot refresh message {:?}: {}",
                    self.chain_id, hash, e
                );
            }
            Err(_) => {
                let reason = format!("probe exceeded {:?}", self.probe_timeout);
                self.destination_failed(destination, &reason).await;
            }
        }
    }

    async fn destination_ready(&self, chain_id: u64) -> bool {
        self.destinations
            .lock()
            .await
            .get(&chain_id)
            .map_or(true, |backoff| backoff.ready(Instant::now()))
    }

    async fn destination_succeeded(&self, chain_id: u64) {
        if let Some(backoff) = self.destinations.lock().await.get_mut(&chain_id) {
            backoff.record_success();
        }
    }

    async fn destination_failed(&self, chain_id: u64, reason: &str) {
        let delay = {
            let mut destinations = self.destinations.lock().await;
            // Concurrent probes may fail together; count the outage once
            let backoff = destinations
                .entry(chain_id)
                .or_insert_with(|| self.new_backoff());
            if !backoff.ready(Instant::now()) {
                return;
            }
            backoff.record_failure(Instant::now())
        };

        crate::metrics::record_poll_error(chain_id);
        warn!(
            "Chain {}: destination {} unavailable, pausing probes for {:?}: {}",
            self.chain_id, chain_id, delay, reason
        );
    }

    fn new_backoff(&self) -> Backoff {
        let config = self.tracker.config();
        Backoff::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    fn publish(&self, status: MessageStatus) {
        if !self.active.load(Ordering::SeqCst) {
            debug!(
                "Discarding status of {:?} from stopped session",
                status.message_hash
            );
            return;
        }

        info!(
            "Message {:?} ({} -> {}) is {}",
            status.message_hash,
            status.source_chain_id(),
            status.destination_chain_id(),
            status.state
        );
        crate::metrics::record_message_state(status.source_chain_id(), status.state);

        // No receivers is fine
        let _ = self.status_tx.send(status);
    }
}
