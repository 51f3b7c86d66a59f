use std::fs;

use anyhow::Context;
use chainprof_core::{keystore::load_accounts, transaction::TransactionCall};
use chainprof_executors::{
    batch::BatchEngine,
    evaluate::{EvaluateRequest, evaluate},
    metrics::export_default_metrics,
};

use super::{batch_config, connect, write_json};
use crate::{EvaluateArgs, config::ChainprofConfig};

pub async fn run(args: EvaluateArgs, config: &ChainprofConfig) -> anyhow::Result<()> {
    let accounts_dir = args.accounts_dir.clone();
    let password = args.password.clone();
    let accounts = tokio::task::spawn_blocking(move || load_accounts(&accounts_dir, &password))
        .await?
        .with_context(|| format!("Failed to load accounts from {}", args.accounts_dir.display()))?;

    if accounts.is_empty() {
        anyhow::bail!("No accounts found in {}", args.accounts_dir.display());
    }

    tracing::info!(
        accounts = accounts.len(),
        transactions_per_account = args.transactions_per_account,
        rpc = %args.rpc,
        "Starting evaluation"
    );

    let chain = connect(&args.rpc).await?;
    let engine = BatchEngine::new(chain, batch_config(config, &args.batch));

    let request = EvaluateRequest {
        rpc_endpoint: args.rpc.clone(),
        call: TransactionCall {
            to: args.to,
            value: args.value,
            data: args.calldata.clone(),
        },
        transactions_per_account: args.transactions_per_account,
    };

    let performance = evaluate(&engine, accounts, &request).await?;

    if performance.total_transactions_mined < performance.total_transactions_sent {
        tracing::warn!(
            sent = performance.total_transactions_sent,
            mined = performance.total_transactions_mined,
            "Not every transaction was mined"
        );
    }

    if args.raw_results {
        write_json(&performance.transactions, args.outfile.as_deref())?;
    } else {
        write_json(&performance, args.outfile.as_deref())?;
    }

    if let Some(path) = &args.metrics_file {
        let metrics =
            export_default_metrics().map_err(|e| anyhow::anyhow!("Failed to export metrics: {e}"))?;
        fs::write(path, metrics)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(())
}
