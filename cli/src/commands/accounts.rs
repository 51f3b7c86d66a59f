use std::path::PathBuf;

use anyhow::Context;
use chainprof_core::{
    keystore::{ProfilingAccount, create_accounts, load_account, load_readable_accounts, read_accounts},
    transaction::{Account, TransactionResult},
};
use chainprof_executors::{
    batch::{BatchEngine, BatchFailure, CompletedBatch},
    funding::{drain_accounts, drain_accounts_erc20, fund_accounts, fund_accounts_erc20},
};
use serde::Serialize;

use super::{batch_config, connect, write_json};
use crate::{AccountsCommand, DrainArgs, FundArgs, config::ChainprofConfig};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchReport<'a> {
    transactions_sent: usize,
    transactions_mined: usize,
    transactions: &'a [TransactionResult],
    failures: &'a [BatchFailure],
}

impl<'a> From<&'a CompletedBatch> for BatchReport<'a> {
    fn from(batch: &'a CompletedBatch) -> Self {
        Self {
            transactions_sent: batch.results.len(),
            transactions_mined: batch.mined_count(),
            transactions: &batch.results,
            failures: &batch.failures,
        }
    }
}

pub async fn run(command: AccountsCommand, config: &ChainprofConfig) -> anyhow::Result<()> {
    match command {
        AccountsCommand::Create {
            accounts_dir,
            password,
            num_accounts,
        } => {
            let dir = accounts_dir.clone();
            let accounts =
                tokio::task::spawn_blocking(move || create_accounts(&dir, num_accounts, &password))
                    .await??;
            tracing::info!(
                count = accounts.len(),
                dir = %accounts_dir.display(),
                "Created accounts"
            );
            write_json(&accounts, None)
        }
        AccountsCommand::Fund(args) => {
            let (funder, recipients) = funder_and_recipients(&args).await?;
            let chain = connect(&args.rpc).await?;
            let engine = BatchEngine::new(chain, batch_config(config, &args.batch));

            let batch = fund_accounts(&engine, funder, &recipients, args.value).await?;
            write_json(&BatchReport::from(&batch), args.outfile.as_deref())
        }
        AccountsCommand::FundErc20 {
            fund: args,
            token_address,
        } => {
            let (funder, recipients) = funder_and_recipients(&args).await?;
            let chain = connect(&args.rpc).await?;
            let engine = BatchEngine::new(chain, batch_config(config, &args.batch));

            let batch =
                fund_accounts_erc20(&engine, funder, token_address, &recipients, args.value).await?;
            write_json(&BatchReport::from(&batch), args.outfile.as_deref())
        }
        AccountsCommand::Drain(args) => {
            let accounts = readable_accounts(&args).await?;
            let chain = connect(&args.rpc).await?;
            let engine = BatchEngine::new(chain, batch_config(config, &args.batch));

            let batch = drain_accounts(&engine, accounts, args.send_to).await?;
            write_json(&BatchReport::from(&batch), args.outfile.as_deref())
        }
        AccountsCommand::DrainErc20 {
            drain: args,
            token_address,
        } => {
            let accounts = readable_accounts(&args).await?;
            let chain = connect(&args.rpc).await?;
            let engine = BatchEngine::new(chain, batch_config(config, &args.batch));

            let batch = drain_accounts_erc20(&engine, accounts, token_address, args.send_to).await?;
            write_json(&BatchReport::from(&batch), args.outfile.as_deref())
        }
    }
}

async fn funder_and_recipients(
    args: &FundArgs,
) -> anyhow::Result<(ProfilingAccount, Vec<Account>)> {
    let keyfile: PathBuf = args.keyfile.clone();
    let password = args.password.clone();
    let funder = tokio::task::spawn_blocking(move || load_account(&keyfile, &password))
        .await?
        .with_context(|| format!("Failed to load funder keyfile {}", args.keyfile.display()))?;

    let recipients = read_accounts(&args.accounts_dir)
        .with_context(|| format!("Failed to read accounts in {}", args.accounts_dir.display()))?;
    if recipients.is_empty() {
        anyhow::bail!("No accounts found in {}", args.accounts_dir.display());
    }

    tracing::info!(
        funder = ?funder.address(),
        recipients = recipients.len(),
        "Funding accounts"
    );

    Ok((funder, recipients))
}

async fn readable_accounts(args: &DrainArgs) -> anyhow::Result<Vec<ProfilingAccount>> {
    let dir = args.accounts_dir.clone();
    let password = args.password.clone();
    let accounts = tokio::task::spawn_blocking(move || load_readable_accounts(&dir, &password))
        .await?
        .with_context(|| format!("Failed to read accounts in {}", args.accounts_dir.display()))?;

    tracing::info!(accounts = accounts.len(), "Draining accounts");
    Ok(accounts)
}
