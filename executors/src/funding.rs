use std::sync::Arc;

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
};
use chainprof_core::{
    chain::ChainClient,
    keystore::{ProfilingAccount, unique_accounts},
    transaction::{Account, TransactionCall, TransactionOptions},
};
use futures::future::join_all;

use crate::{
    batch::{BatchEngine, CompletedBatch, SendJob},
    error::ExecutorError,
    nonce_manager::NonceAllocator,
};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Fee cap used when draining, in wei per gas.
pub const DRAIN_MAX_FEE_PER_GAS: u128 = 10_000_000;
/// Tip used when draining, in wei per gas.
pub const DRAIN_MAX_PRIORITY_FEE_PER_GAS: u128 = 1;
/// Gas budget reserved out of a drained balance to pay for the drain itself.
pub const DRAIN_GAS_BUDGET: u64 = 1_000_000;

/// Wei held back from a drained balance.
pub fn drain_transaction_cost() -> U256 {
    U256::from(DRAIN_GAS_BUDGET) * U256::from(DRAIN_MAX_FEE_PER_GAS)
}

pub fn erc20_transfer_calldata(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

/// Sends one call per recipient from `funder`, with nonces reserved up front.
async fn fund_from<C, F>(
    engine: &BatchEngine<C>,
    funder: ProfilingAccount,
    recipients: &[Account],
    call_for: F,
) -> Result<CompletedBatch, ExecutorError>
where
    C: ChainClient,
    F: Fn(&Account) -> TransactionCall,
{
    let allocator = NonceAllocator::new(engine.chain().clone());
    let reservation = allocator
        .reserve(funder.address(), recipients.len() as u64)
        .await?;

    let funder = Arc::new(funder);
    let jobs: Vec<SendJob> = recipients
        .iter()
        .zip(reservation.nonces())
        .map(|(recipient, nonce)| SendJob {
            account: funder.clone(),
            call: call_for(recipient),
            options: TransactionOptions::with_nonce(nonce),
        })
        .collect();

    engine.run(jobs).await
}

/// Sends `value` wei from `funder` to every recipient.
#[tracing::instrument(skip_all, fields(funder = ?funder.address(), recipients = recipients.len()))]
pub async fn fund_accounts<C: ChainClient>(
    engine: &BatchEngine<C>,
    funder: ProfilingAccount,
    recipients: &[Account],
    value: U256,
) -> Result<CompletedBatch, ExecutorError> {
    fund_from(engine, funder, recipients, |recipient| TransactionCall {
        to: recipient.address,
        value,
        data: Bytes::new(),
    })
    .await
}

/// Transfers `amount` of `token` from `funder` to every recipient.
#[tracing::instrument(skip_all, fields(funder = ?funder.address(), token = ?token, recipients = recipients.len()))]
pub async fn fund_accounts_erc20<C: ChainClient>(
    engine: &BatchEngine<C>,
    funder: ProfilingAccount,
    token: Address,
    recipients: &[Account],
    amount: U256,
) -> Result<CompletedBatch, ExecutorError> {
    fund_from(engine, funder, recipients, |recipient| TransactionCall {
        to: token,
        value: U256::ZERO,
        data: erc20_transfer_calldata(recipient.address, amount),
    })
    .await
}

/// Sends each account's native balance, minus the drain cost, to `recipient`.
/// Accounts whose balance cannot be read or does not cover the cost are skipped.
#[tracing::instrument(skip_all, fields(accounts = accounts.len(), recipient = ?recipient))]
pub async fn drain_accounts<C: ChainClient>(
    engine: &BatchEngine<C>,
    accounts: Vec<ProfilingAccount>,
    recipient: Address,
) -> Result<CompletedBatch, ExecutorError> {
    let chain = engine.chain();
    let cost = drain_transaction_cost();
    let accounts = unique_accounts(accounts);

    let balances = join_all(accounts.iter().map(|account| chain.balance(account.address()))).await;

    let jobs: Vec<SendJob> = accounts
        .into_iter()
        .zip(balances)
        .filter_map(|(account, balance)| {
            let balance = match balance {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::warn!(address = ?account.address(), error = %e, "Failed to read balance, skipping");
                    return None;
                }
            };

            if balance < cost {
                tracing::info!(address = ?account.address(), balance = %balance, "Insufficient funds to drain, skipping");
                return None;
            }

            Some(SendJob {
                account: Arc::new(account),
                call: TransactionCall {
                    to: recipient,
                    value: balance - cost,
                    data: Bytes::new(),
                },
                options: TransactionOptions::with_fees(
                    DRAIN_MAX_FEE_PER_GAS,
                    DRAIN_MAX_PRIORITY_FEE_PER_GAS,
                ),
            })
        })
        .collect();

    engine.run(jobs).await
}

async fn erc20_balance<C: ChainClient>(
    chain: &C,
    token: Address,
    owner: Address,
) -> Result<U256, ExecutorError> {
    let request = TransactionRequest::default()
        .with_to(token)
        .with_input(IERC20::balanceOfCall { owner }.abi_encode());

    let output = chain
        .call(request)
        .await
        .map_err(|e| ExecutorError::BalanceLookupFailed {
            address: owner,
            message: format!("balanceOf call failed: {e}"),
            inner_error: Some(e),
        })?;

    IERC20::balanceOfCall::abi_decode_returns(&output).map_err(|e| {
        ExecutorError::BalanceLookupFailed {
            address: owner,
            message: format!("Failed to decode balanceOf output: {e}"),
            inner_error: None,
        }
    })
}

/// Transfers each account's whole `token` balance to `recipient`. Zero and
/// unreadable balances are skipped.
#[tracing::instrument(skip_all, fields(accounts = accounts.len(), token = ?token, recipient = ?recipient))]
pub async fn drain_accounts_erc20<C: ChainClient>(
    engine: &BatchEngine<C>,
    accounts: Vec<ProfilingAccount>,
    token: Address,
    recipient: Address,
) -> Result<CompletedBatch, ExecutorError> {
    let chain = engine.chain();
    let accounts = unique_accounts(accounts);

    let balances = join_all(
        accounts
            .iter()
            .map(|account| erc20_balance(chain.as_ref(), token, account.address())),
    )
    .await;

    let jobs: Vec<SendJob> = accounts
        .into_iter()
        .zip(balances)
        .filter_map(|(account, balance)| {
            let balance = match balance {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::warn!(address = ?account.address(), error = %e, "Failed to read token balance, skipping");
                    return None;
                }
            };

            if balance.is_zero() {
                tracing::info!(address = ?account.address(), "No token balance to drain, skipping");
                return None;
            }

            Some(SendJob {
                account: Arc::new(account),
                call: TransactionCall {
                    to: token,
                    value: U256::ZERO,
                    data: erc20_transfer_calldata(recipient, balance),
                },
                options: TransactionOptions::default(),
            })
        })
        .collect();

    engine.run(jobs).await
}
