use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::primitives::TxHash;
use chainprof_core::{
    chain::ChainClient,
    transaction::{ReceiptSummary, TransactionResult},
};
use chrono::Utc;
use tokio::{sync::mpsc, task::JoinSet};

use crate::{
    batch::{BatchConfig, BatchFailure, FailureStage, acquire_slot},
    error::ExecutorError,
    metrics::{
        BatchPhase, calculate_duration_seconds, current_timestamp_ms, record_batch_phase,
        record_transaction_mined,
    },
    send::SubmittedTransaction,
};

/// Receipts observed by the mining phase, keyed by the submitted transaction hash.
#[derive(Debug, Default)]
pub struct MiningOutcome {
    pub receipts: HashMap<TxHash, ReceiptSummary>,
    pub failures: Vec<BatchFailure>,
}

impl MiningOutcome {
    /// Writes cost fields into the results whose hash has a receipt. Returns
    /// how many results were updated.
    pub fn apply_to(&self, results: &mut [TransactionResult]) -> usize {
        results
            .iter_mut()
            .filter_map(|result| {
                self.receipts
                    .get(&result.hash)
                    .map(|receipt| result.apply_receipt(receipt))
            })
            .filter(|applied| *applied)
            .count()
    }
}

enum WaitOutcome {
    /// Receipt for the hash that was waited on.
    Mined(TxHash, ReceiptSummary),
    Failed(BatchFailure),
}

/// Waits for submitted transactions to be included in a block.
pub struct MiningWaiter<C> {
    chain: Arc<C>,
    config: BatchConfig,
}

impl<C: ChainClient> MiningWaiter<C> {
    pub fn new(chain: Arc<C>, config: BatchConfig) -> Self {
        Self { chain, config }
    }

    #[tracing::instrument(skip_all, fields(chain_id = self.chain.chain_id(), pending = submitted.len()))]
    pub async fn wait_all(
        &self,
        submitted: &[SubmittedTransaction],
    ) -> Result<MiningOutcome, ExecutorError> {
        let start_time = current_timestamp_ms();
        let chain_id = self.chain.chain_id();

        tracing::info!(
            pending = submitted.len(),
            timeout_seconds = ?self.config.receipt_timeout.map(|t| t.as_secs()),
            "Waiting for transactions to be mined"
        );

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<WaitOutcome>();

        let collector = tokio::spawn(async move {
            let mut outcome = MiningOutcome::default();
            while let Some(wait) = outcome_rx.recv().await {
                match wait {
                    WaitOutcome::Mined(hash, receipt) => {
                        outcome.receipts.insert(hash, receipt);
                    }
                    WaitOutcome::Failed(failure) => outcome.failures.push(failure),
                }
            }
            outcome
        });

        let semaphore = self.config.semaphore();
        let mut tasks = JoinSet::new();

        for handle in submitted.iter().copied() {
            let chain = self.chain.clone();
            let outcome_tx = outcome_tx.clone();
            let semaphore = semaphore.clone();
            let poll_interval = self.config.receipt_poll_interval;
            let timeout = self.config.receipt_timeout;

            tasks.spawn(async move {
                let _permit = acquire_slot(&semaphore).await;

                let outcome = match wait_mined(chain.as_ref(), handle.hash, poll_interval, timeout).await {
                    Ok(receipt) => {
                        let waited = (Utc::now() - handle.submitted_at)
                            .to_std()
                            .unwrap_or_default()
                            .as_secs_f64();
                        record_transaction_mined(chain_id, waited);

                        if !receipt.success {
                            tracing::warn!(hash = ?handle.hash, "Transaction mined but reverted");
                        }
                        if receipt.transaction_hash != handle.hash {
                            tracing::warn!(
                                hash = ?handle.hash,
                                receipt_hash = ?receipt.transaction_hash,
                                "Receipt reports a different transaction hash"
                            );
                        }
                        WaitOutcome::Mined(handle.hash, receipt)
                    }
                    Err(error) => {
                        tracing::error!(
                            hash = ?handle.hash,
                            from = ?handle.from,
                            nonce = handle.nonce,
                            error = %error,
                            "Mining wait failed"
                        );
                        WaitOutcome::Failed(BatchFailure {
                            stage: FailureStage::Mining,
                            from: Some(handle.from),
                            nonce: Some(handle.nonce),
                            hash: Some(handle.hash),
                            error,
                        })
                    }
                };

                let _ = outcome_tx.send(outcome);
            });
        }

        drop(outcome_tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Mining wait task did not complete");
            }
        }

        let outcome = collector.await.map_err(|e| ExecutorError::InternalError {
            message: format!("Mining collector failed: {e}"),
        })?;

        let duration_seconds = calculate_duration_seconds(start_time, current_timestamp_ms());
        record_batch_phase(chain_id, BatchPhase::Mining, duration_seconds);

        tracing::info!(
            mined = outcome.receipts.len(),
            failed = outcome.failures.len(),
            duration_seconds = duration_seconds,
            "Mining phase finished"
        );

        Ok(outcome)
    }
}

/// Polls for the receipt of `hash` until it is available. Any RPC error ends
/// the wait; so does `timeout` when set.
pub async fn wait_mined<C: ChainClient>(
    chain: &C,
    hash: TxHash,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> Result<ReceiptSummary, ExecutorError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, poll_receipt(chain, hash, poll_interval))
            .await
            .map_err(|_| ExecutorError::ReceiptTimeout {
                hash,
                waited_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })?,
        None => poll_receipt(chain, hash, poll_interval).await,
    }
}

async fn poll_receipt<C: ChainClient>(
    chain: &C,
    hash: TxHash,
    poll_interval: Duration,
) -> Result<ReceiptSummary, ExecutorError> {
    loop {
        match chain.transaction_receipt(hash).await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {
                tracing::trace!(hash = ?hash, "Transaction not yet mined");
                tokio::time::sleep(poll_interval).await;
            }
            Err(e) => {
                return Err(ExecutorError::ReceiptError {
                    hash,
                    message: e.to_string(),
                    inner_error: e,
                });
            }
        }
    }
}
