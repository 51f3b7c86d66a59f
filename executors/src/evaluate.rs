use std::sync::Arc;

use alloy::primitives::Address;
use chainprof_core::{
    chain::ChainClient,
    keystore::{ProfilingAccount, unique_accounts},
    transaction::TransactionCall,
};
use chrono::Utc;

use crate::{
    batch::{BatchEngine, SendJob},
    error::ExecutorError,
    nonce_manager::NonceAllocator,
    performance::{ChainPerformance, RunParameters, aggregate_performance},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateRequest {
    pub rpc_endpoint: String,
    pub call: TransactionCall,
    pub transactions_per_account: u64,
}

/// Sends `transactions_per_account` copies of the call from every account,
/// waits for them to be mined and reports the chain's performance.
///
/// Nonces for every account are reserved before the first send, so an
/// unreachable endpoint fails the run without broadcasting anything.
#[tracing::instrument(skip_all, fields(
    chain_id = engine.chain().chain_id(),
    accounts = accounts.len(),
    transactions_per_account = request.transactions_per_account
))]
pub async fn evaluate<C: ChainClient>(
    engine: &BatchEngine<C>,
    accounts: Vec<ProfilingAccount>,
    request: &EvaluateRequest,
) -> Result<ChainPerformance, ExecutorError> {
    let started_at = Utc::now();

    let accounts: Vec<Arc<ProfilingAccount>> = unique_accounts(accounts)
        .into_iter()
        .map(Arc::new)
        .collect();
    let addresses: Vec<Address> = accounts.iter().map(|account| account.address()).collect();

    let allocator = NonceAllocator::new(engine.chain().clone());
    let reservations = allocator
        .reserve_all(&addresses, request.transactions_per_account)
        .await?;

    let jobs: Vec<SendJob> = accounts
        .iter()
        .zip(&reservations)
        .flat_map(|(account, reservation)| {
            SendJob::for_reservation(account.clone(), reservation, &request.call)
        })
        .collect();

    tracing::info!(transactions = jobs.len(), "Dispatching evaluation batch");

    let batch = engine.run(jobs).await?;
    let finished_at = Utc::now();

    let parameters = RunParameters {
        rpc_endpoint: request.rpc_endpoint.clone(),
        calldata: request.call.data.clone(),
        to: request.call.to,
        value: request.call.value,
        transactions_per_account: request.transactions_per_account,
    };

    Ok(aggregate_performance(
        engine.chain().as_ref(),
        &parameters,
        addresses,
        batch.results,
        batch.failures,
        started_at,
        finished_at,
    )
    .await)
}
