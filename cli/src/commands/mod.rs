use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use chainprof_core::chain::{RpcChain, RpcChainConfig};
use chainprof_executors::batch::BatchConfig;
use serde::Serialize;

use crate::{BatchArgs, config::ChainprofConfig};

pub mod accounts;
pub mod evaluate;

/// Configuration values overridden by whatever flags were given.
pub fn batch_config(config: &ChainprofConfig, args: &BatchArgs) -> BatchConfig {
    let mut batch = config.batch.to_batch_config();
    if let Some(limit) = args.max_concurrency {
        batch.max_concurrency = Some(limit);
    }
    if let Some(seconds) = args.receipt_timeout {
        batch.receipt_timeout = Some(std::time::Duration::from_secs(seconds));
    }
    batch
}

pub async fn connect(rpc: &str) -> anyhow::Result<Arc<RpcChain>> {
    let chain = RpcChainConfig { rpc_url: rpc }
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {rpc}"))?;
    Ok(Arc::new(chain))
}

/// Writes `value` as pretty JSON to `outfile`, or to stdout when absent.
pub fn write_json<T: Serialize>(value: &T, outfile: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match outfile {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::BatchSettings;

    #[test]
    fn flags_override_configuration() {
        let config = ChainprofConfig {
            batch: BatchSettings {
                max_concurrency: Some(8),
                receipt_timeout_seconds: Some(60),
                receipt_poll_interval_ms: 500,
            },
            ..Default::default()
        };

        let untouched = batch_config(
            &config,
            &BatchArgs {
                max_concurrency: None,
                receipt_timeout: None,
            },
        );
        assert_eq!(untouched.max_concurrency, Some(8));
        assert_eq!(untouched.receipt_timeout, Some(Duration::from_secs(60)));

        let overridden = batch_config(
            &config,
            &BatchArgs {
                max_concurrency: Some(2),
                receipt_timeout: Some(5),
            },
        );
        assert_eq!(overridden.max_concurrency, Some(2));
        assert_eq!(overridden.receipt_timeout, Some(Duration::from_secs(5)));
        assert_eq!(overridden.receipt_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn json_output_goes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        write_json(&serde_json::json!({ "totalTransactionsSent": 6 }), Some(&path)).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["totalTransactionsSent"], 6);
    }
}
