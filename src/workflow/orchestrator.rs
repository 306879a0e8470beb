//! Swap -> bridge -> swap execution and completion tracking

use super::dex::{encode_swap, SwapRequest};
use super::routing::RouteBook;
use super::{
    OperationKind, OperationStatus, SwapBridgeSwapParams, WorkflowFailure, WorkflowOperation,
    WorkflowResult,
};
use crate::config::WorkflowConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::execution::ExecutionProvider;
use crate::message::{MessageState, MessageStatus};
use crate::monitor::LifecycleMonitor;

use chrono::Utc;
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Calldata for every step, built before anything is submitted
struct ExecutionPlan {
    source_router: Address,
    source_calldata: Bytes,
    /// Bridged token on the source chain
    bridge_token: Address,
    destination_router: Address,
    destination_calldata: Bytes,
}

/// Drives swap -> bridge -> swap workflows
pub struct WorkflowOrchestrator {
    monitor: Arc<LifecycleMonitor>,
    executor: Arc<dyn ExecutionProvider>,
    routes: RouteBook,
    config: WorkflowConfig,
}

impl WorkflowOrchestrator {
    pub fn new(
        monitor: Arc<LifecycleMonitor>,
        executor: Arc<dyn ExecutionProvider>,
        routes: RouteBook,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            monitor,
            executor,
            routes,
            config,
        }
    }

    pub fn monitor(&self) -> &LifecycleMonitor {
        &self.monitor
    }

    /// Swap on the source chain, bridge the output and swap it on the destination.
    ///
    /// Steps run strictly in order. The first failing step is recorded as failed
    /// and nothing after it is submitted.
    pub async fn execute_swap_bridge_swap(
        &self,
        params: SwapBridgeSwapParams,
    ) -> Result<WorkflowResult, WorkflowFailure> {
        let source = params.source_chain_id;
        let destination = params.destination_chain_id;
        let mut result =
            WorkflowResult::new(source, destination, self.config.estimated_completion_secs);

        let plan = match self.plan(&params) {
            Ok(plan) => plan,
            Err(error) => {
                warn!("Workflow {} rejected: {}", result.id, error);
                return Err(WorkflowFailure {
                    partial: result,
                    error,
                });
            }
        };

        info!(
            "Workflow {}: {} {} on chain {} -> {} on chain {}",
            result.id, params.amount_in, params.token_in, source, params.token_out, destination
        );
        crate::metrics::record_workflow_started();

        let swap_tx = match self
            .executor
            .submit_local(source, plan.source_router, U256::zero(), plan.source_calldata)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(error) => return Err(halt(result, OperationKind::Swap, source, error)),
        };
        debug!("Workflow {}: source swap {:?}", result.id, swap_tx);
        result.source_swap_tx = Some(swap_tx);
        result.push(WorkflowOperation::completed(OperationKind::Swap, source, swap_tx));

        let bridge_tx = match self
            .executor
            .submit_bridge(source, destination, plan.bridge_token, params.min_bridge_amount)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(error) => return Err(halt(result, OperationKind::Bridge, source, error)),
        };
        debug!("Workflow {}: bridge {:?}", result.id, bridge_tx);
        result.bridge_tx = Some(bridge_tx);
        result.push(WorkflowOperation::completed(OperationKind::Bridge, source, bridge_tx));

        let submission = match self
            .executor
            .submit_cross_chain(
                source,
                destination,
                plan.destination_router,
                plan.destination_calldata,
            )
            .await
        {
            Ok(submission) => submission,
            Err(error) => return Err(halt(result, OperationKind::CrossChainSwap, source, error)),
        };

        info!(
            "Workflow {}: destination swap sent as message {:?}",
            result.id, submission.message_hash
        );
        result.destination_message_hash = Some(submission.message_hash);
        result.push(WorkflowOperation {
            kind: OperationKind::CrossChainSwap,
            chain_id: source,
            tx_hash: Some(submission.tx_hash),
            message_hash: Some(submission.message_hash),
            status: OperationStatus::Pending,
        });

        Ok(result)
    }

    fn plan(&self, params: &SwapBridgeSwapParams) -> MonitorResult<ExecutionPlan> {
        let source = params.source_chain_id;
        let destination = params.destination_chain_id;
        let deadline = Utc::now().timestamp().max(0) as u64 + self.config.swap_deadline_secs;

        let source_swap = SwapRequest {
            token_in: self.routes.resolve_token(source, &params.token_in)?,
            token_out: self.routes.resolve_token(source, &params.bridge_token)?,
            amount_in: params.amount_in,
            min_amount_out: params.min_bridge_amount,
            recipient: params.account,
        };
        let destination_swap = SwapRequest {
            token_in: self.routes.resolve_token(destination, &params.bridge_token)?,
            token_out: self.routes.resolve_token(destination, &params.token_out)?,
            amount_in: params.min_bridge_amount,
            min_amount_out: params.min_amount_out,
            recipient: params.recipient,
        };

        let (source_router, source_calldata) =
            encode_swap(self.routes.dex(source)?, &source_swap, deadline)?;
        let (destination_router, destination_calldata) =
            encode_swap(self.routes.dex(destination)?, &destination_swap, deadline)?;

        Ok(ExecutionPlan {
            source_router,
            source_calldata,
            bridge_token: source_swap.token_out,
            destination_router,
            destination_calldata,
        })
    }

    /// Current status of every cross-chain message of the workflow
    pub async fn monitor_swap_bridge_swap(&self, result: &WorkflowResult) -> Vec<MessageStatus> {
        let requests: Vec<_> = result
            .operations
            .iter()
            .filter(|op| op.message_hash.is_some())
            .filter_map(|op| op.tx_hash.map(|tx| (op.chain_id, tx)))
            .collect();

        self.monitor.get_messages_status(&requests).await
    }

    /// Poll the tracked message until it settles or `timeout` elapses.
    ///
    /// Returns true once relayed. A failed or expired message marks the
    /// operation failed and returns false; a timeout leaves it pending.
    /// A transaction emitting a different message than the one recorded at
    /// submission is an `Internal` error and settles nothing.
    pub async fn wait_for_completion(
        &self,
        result: &mut WorkflowResult,
        timeout: Duration,
    ) -> MonitorResult<bool> {
        let operation = result.tracked_message().ok_or_else(|| {
            MonitorError::Internal(format!("Workflow {} has no cross-chain operation", result.id))
        })?;
        let chain_id = operation.chain_id;
        let expected_hash = operation.message_hash;
        let tx_hash = operation.tx_hash.ok_or_else(|| {
            MonitorError::Internal(format!(
                "Workflow {} cross-chain operation has no transaction",
                result.id
            ))
        })?;

        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(self.config.completion_poll_interval_ms.max(1));

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, self.monitor.monitor_message(chain_id, tx_hash))
                .await
            {
                Ok(Ok(status)) => {
                    if Some(status.message_hash) != expected_hash {
                        return Err(MonitorError::Internal(format!(
                            "Workflow {}: tx {:?} emitted message {:?}, expected {:?}",
                            result.id, tx_hash, status.message_hash, expected_hash
                        )));
                    }

                    match status.state {
                        MessageState::Relayed => {
                            result.resolve_message(OperationStatus::Completed);
                            info!("Workflow {} completed", result.id);
                            return Ok(true);
                        }
                        MessageState::Failed | MessageState::Expired => {
                            result.resolve_message(OperationStatus::Failed);
                            crate::metrics::record_workflow_halted(OperationKind::CrossChainSwap);
                            warn!(
                                "Workflow {}: destination swap {}",
                                result.id, status.state
                            );
                            return Ok(false);
                        }
                        MessageState::Sent => {}
                    }
                }
                Ok(Err(e)) if e.is_retryable() || matches!(e, MonitorError::NotFound(_)) => {
                    debug!("Workflow {}: waiting for tx {:?}: {}", result.id, tx_hash, e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }

        info!(
            "Workflow {} still pending after {:?}",
            result.id, timeout
        );
        Ok(false)
    }
}

fn halt(
    mut result: WorkflowResult,
    kind: OperationKind,
    chain_id: u64,
    error: MonitorError,
) -> WorkflowFailure {
    warn!(
        "Workflow {} halted at {} on chain {}: {}",
        result.id,
        kind.as_str(),
        chain_id,
        error
    );
    crate::metrics::record_workflow_halted(kind);
    result.push(WorkflowOperation::failed(kind, chain_id));

    WorkflowFailure {
        partial: result,
        error,
    }
}
