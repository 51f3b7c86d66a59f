use std::sync::Arc;

use chainprof_core::{chain::ChainClient, transaction::TransactionResult};
use tokio::{sync::mpsc, task::JoinSet};

use crate::{
    batch::{BatchConfig, BatchFailure, FailureStage, SendJob, acquire_slot},
    error::{ExecutorError, SendErrorClassification},
    metrics::{BatchPhase, calculate_duration_seconds, current_timestamp_ms, record_batch_phase},
    send::{SubmittedTransaction, TransactionSender},
};

/// Everything the submission phase produced. `results` and `submitted` are
/// appended in lock-step, so they describe the same transactions.
#[derive(Debug, Default)]
pub struct SubmittedBatch {
    pub results: Vec<TransactionResult>,
    pub submitted: Vec<SubmittedTransaction>,
    pub failures: Vec<BatchFailure>,
}

enum SendOutcome {
    Submitted(Box<TransactionResult>, SubmittedTransaction),
    Failed(BatchFailure),
}

/// Fans send jobs out to concurrent tasks and fans their outcomes back in
/// through a single collector.
pub struct BatchDispatcher<C> {
    sender: TransactionSender<C>,
    config: BatchConfig,
    chain_id: u64,
}

impl<C: ChainClient> BatchDispatcher<C> {
    pub fn new(chain: Arc<C>, config: BatchConfig) -> Self {
        Self {
            chain_id: chain.chain_id(),
            sender: TransactionSender::new(chain),
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(chain_id = self.chain_id, jobs = jobs.len()))]
    pub async fn dispatch(&self, jobs: Vec<SendJob>) -> Result<SubmittedBatch, ExecutorError> {
        let start_time = current_timestamp_ms();
        let total = jobs.len();

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<SendOutcome>();

        let collector = tokio::spawn(async move {
            let mut batch = SubmittedBatch::default();
            while let Some(outcome) = outcome_rx.recv().await {
                match outcome {
                    SendOutcome::Submitted(result, handle) => {
                        batch.results.push(*result);
                        batch.submitted.push(handle);
                    }
                    SendOutcome::Failed(failure) => batch.failures.push(failure),
                }
            }
            batch
        });

        let semaphore = self.config.semaphore();
        let mut tasks = JoinSet::new();

        for job in jobs {
            let sender = self.sender.clone();
            let outcome_tx = outcome_tx.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = acquire_slot(&semaphore).await;

                let outcome = match sender.send(&job.account, &job.call, job.options).await {
                    Ok((result, handle)) => SendOutcome::Submitted(Box::new(result), handle),
                    Err(error) => {
                        log_send_failure(&job, &error);
                        SendOutcome::Failed(BatchFailure {
                            stage: FailureStage::Send,
                            from: Some(job.account.address()),
                            nonce: job.options.nonce,
                            hash: None,
                            error,
                        })
                    }
                };

                // the collector outlives every sender clone
                let _ = outcome_tx.send(outcome);
            });
        }

        drop(outcome_tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Send task did not complete");
            }
        }

        let batch = collector.await.map_err(|e| ExecutorError::InternalError {
            message: format!("Submission collector failed: {e}"),
        })?;

        let duration_seconds = calculate_duration_seconds(start_time, current_timestamp_ms());
        record_batch_phase(self.chain_id, BatchPhase::Submission, duration_seconds);

        tracing::info!(
            requested = total,
            submitted = batch.submitted.len(),
            failed = batch.failures.len(),
            duration_seconds = duration_seconds,
            "Submission phase finished"
        );

        Ok(batch)
    }
}

fn log_send_failure(job: &SendJob, error: &ExecutorError) {
    match error {
        ExecutorError::TransactionSendError {
            classification: SendErrorClassification::PossiblySent,
            ..
        } => tracing::warn!(
            from = ?job.account.address(),
            nonce = ?job.options.nonce,
            error = %error,
            "Broadcast rejected but the transaction may still be mined; it is excluded from results"
        ),
        _ => tracing::error!(
            from = ?job.account.address(),
            nonce = ?job.options.nonce,
            error = %error,
            "Transaction send failed"
        ),
    }
}
