use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, TxHash};
use chainprof_core::{
    chain::ChainClient,
    keystore::ProfilingAccount,
    transaction::{TransactionCall, TransactionOptions, TransactionResult},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    confirm::MiningWaiter,
    dispatch::BatchDispatcher,
    error::ExecutorError,
    nonce_manager::NonceReservation,
};

/// Tuning knobs shared by the submission and mining phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Upper bound on in-flight send or wait tasks; `None` is unbounded. A
    /// limit of 0 is raised to 1 so a batch always makes progress.
    pub max_concurrency: Option<usize>,
    /// Per-transaction mining wait limit; `None` waits forever.
    pub receipt_timeout: Option<Duration>,
    pub receipt_poll_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            receipt_timeout: None,
            receipt_poll_interval: Duration::from_secs(1),
        }
    }
}

impl BatchConfig {
    pub(crate) fn semaphore(&self) -> Option<Arc<Semaphore>> {
        self.max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))))
    }
}

/// Waits for a slot when the batch is bounded. A closed semaphore never
/// happens here, so a failed acquire just runs unbounded.
pub(crate) async fn acquire_slot(semaphore: &Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
    match semaphore {
        Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
        None => None,
    }
}

/// One transaction to send: who signs, what to call, and its overrides.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub account: Arc<ProfilingAccount>,
    pub call: TransactionCall,
    pub options: TransactionOptions,
}

impl SendJob {
    /// One job per reserved nonce, each carrying the same call.
    pub fn for_reservation(
        account: Arc<ProfilingAccount>,
        reservation: &NonceReservation,
        call: &TransactionCall,
    ) -> Vec<SendJob> {
        reservation
            .nonces()
            .map(|nonce| SendJob {
                account: account.clone(),
                call: call.clone(),
                options: TransactionOptions::with_nonce(nonce),
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStage {
    Send,
    Mining,
    BlockLookup,
}

/// A transaction-level failure that did not abort the batch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub stage: FailureStage,
    pub from: Option<Address>,
    pub nonce: Option<u64>,
    pub hash: Option<TxHash>,
    pub error: ExecutorError,
}

/// Results of a run after both phases, sorted by `(from, nonce)`.
#[derive(Debug, Clone, Default)]
pub struct CompletedBatch {
    pub results: Vec<TransactionResult>,
    pub failures: Vec<BatchFailure>,
}

impl CompletedBatch {
    pub fn mined_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_mined()).count()
    }
}

pub fn sort_results(results: &mut [TransactionResult]) {
    results.sort_by(|a, b| (a.from, a.nonce).cmp(&(b.from, b.nonce)));
}

/// Drives the submission phase and then the mining phase over one set of jobs.
pub struct BatchEngine<C> {
    chain: Arc<C>,
    config: BatchConfig,
}

impl<C: ChainClient> BatchEngine<C> {
    pub fn new(chain: Arc<C>, config: BatchConfig) -> Self {
        Self { chain, config }
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    #[tracing::instrument(skip_all, fields(chain_id = self.chain.chain_id(), jobs = jobs.len()))]
    pub async fn run(&self, jobs: Vec<SendJob>) -> Result<CompletedBatch, ExecutorError> {
        let dispatcher = BatchDispatcher::new(self.chain.clone(), self.config.clone());
        let submitted = dispatcher.dispatch(jobs).await?;

        let waiter = MiningWaiter::new(self.chain.clone(), self.config.clone());
        let mined = waiter.wait_all(&submitted.submitted).await?;

        let mut results = submitted.results;
        let applied = mined.apply_to(&mut results);
        sort_results(&mut results);

        let mut failures = submitted.failures;
        failures.extend(mined.failures);

        tracing::info!(
            submitted = results.len(),
            mined = applied,
            failures = failures.len(),
            "Batch completed"
        );

        Ok(CompletedBatch { results, failures })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Bytes, U256};
    use alloy::signers::local::PrivateKeySigner;
    use chrono::Utc;

    use super::*;

    fn result(from: u8, nonce: u64) -> TransactionResult {
        TransactionResult {
            hash: TxHash::repeat_byte(nonce as u8),
            max_fee_per_gas: 1,
            max_priority_fee_per_gas: 1,
            nonce,
            from: Address::repeat_byte(from),
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            created_at: Utc::now(),
            gas_used: None,
            gas_price: None,
            block_number: None,
        }
    }

    #[test]
    fn results_sort_by_sender_then_nonce() {
        let mut results = vec![result(2, 1), result(1, 5), result(2, 0), result(1, 4)];
        sort_results(&mut results);

        let order: Vec<_> = results.iter().map(|r| (r.from, r.nonce)).collect();
        assert_eq!(
            order,
            vec![
                (Address::repeat_byte(1), 4),
                (Address::repeat_byte(1), 5),
                (Address::repeat_byte(2), 0),
                (Address::repeat_byte(2), 1),
            ]
        );
    }

    #[test]
    fn jobs_follow_the_reservation() {
        let account = Arc::new(ProfilingAccount::new(PrivateKeySigner::random()));
        let reservation = NonceReservation {
            address: account.address(),
            start: 10,
            count: 3,
        };
        let call = TransactionCall {
            to: Address::ZERO,
            value: U256::from(1u64),
            data: Bytes::new(),
        };

        let jobs = SendJob::for_reservation(account, &reservation, &call);
        let nonces: Vec<_> = jobs.iter().map(|job| job.options.nonce).collect();
        assert_eq!(nonces, vec![Some(10), Some(11), Some(12)]);
    }

    #[test]
    fn default_config_is_unbounded_without_timeout() {
        let config = BatchConfig::default();
        assert!(config.semaphore().is_none());
        assert!(config.receipt_timeout.is_none());
        assert_eq!(config.receipt_poll_interval, Duration::from_secs(1));
    }
}
