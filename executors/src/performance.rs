use alloy::primitives::{Address, Bytes, U256};
use chainprof_core::{chain::ChainClient, transaction::TransactionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    batch::{BatchFailure, FailureStage, sort_results},
    error::ExecutorError,
};

/// Summary of one profiling run.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainPerformance {
    pub rpc_endpoint: String,
    pub calldata: Bytes,
    pub to: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub value: U256,
    pub transactions_per_account: u64,
    pub execution_time_seconds: u64,
    pub block_production_time_seconds: u64,
    pub initial_block_number: Option<u64>,
    pub final_block_number: Option<u64>,
    pub initial_block_timestamp: Option<DateTime<Utc>>,
    pub final_block_timestamp: Option<DateTime<Utc>>,
    #[serde_as(as = "DisplayFromStr")]
    pub average_gas_used: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub average_gas_price: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub total_gas_used: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub total_gas_price: u128,
    pub total_transactions_sent: usize,
    pub total_transactions_mined: usize,
    pub accounts: Vec<Address>,
    pub transactions: Vec<TransactionResult>,
    pub failures: Vec<BatchFailure>,
}

/// The request side of a run, echoed into the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    pub rpc_endpoint: String,
    pub calldata: Bytes,
    pub to: Address,
    pub value: U256,
    pub transactions_per_account: u64,
}

/// Block span and cost totals over mined results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinedStatistics {
    pub mined: usize,
    pub initial_block_number: Option<u64>,
    pub final_block_number: Option<u64>,
    pub total_gas_used: u128,
    pub total_gas_price: u128,
}

impl MinedStatistics {
    /// Results without cost fields are skipped entirely.
    pub fn from_results(results: &[TransactionResult]) -> Self {
        let mut stats = MinedStatistics::default();

        for result in results {
            let (Some(gas_used), Some(gas_price), Some(block_number)) =
                (result.gas_used, result.gas_price, result.block_number)
            else {
                continue;
            };

            stats.mined += 1;
            stats.total_gas_used += u128::from(gas_used);
            stats.total_gas_price += gas_price;
            stats.initial_block_number = Some(
                stats
                    .initial_block_number
                    .map_or(block_number, |current| current.min(block_number)),
            );
            stats.final_block_number = Some(
                stats
                    .final_block_number
                    .map_or(block_number, |current| current.max(block_number)),
            );
        }

        stats
    }

    pub fn average_gas_used(&self) -> u128 {
        self.total_gas_used.checked_div(self.mined as u128).unwrap_or(0)
    }

    pub fn average_gas_price(&self) -> u128 {
        self.total_gas_price.checked_div(self.mined as u128).unwrap_or(0)
    }
}

/// Chain-observed boundaries of the mined span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockTimestamps {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl BlockTimestamps {
    pub fn production_time_seconds(&self) -> u64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) => (last - first).num_seconds().max(0) as u64,
            _ => 0,
        }
    }
}

impl ChainPerformance {
    /// Assembles the report without touching the network.
    pub fn from_parts(
        parameters: &RunParameters,
        accounts: Vec<Address>,
        mut transactions: Vec<TransactionResult>,
        failures: Vec<BatchFailure>,
        timestamps: BlockTimestamps,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        sort_results(&mut transactions);
        let stats = MinedStatistics::from_results(&transactions);

        ChainPerformance {
            rpc_endpoint: parameters.rpc_endpoint.clone(),
            calldata: parameters.calldata.clone(),
            to: parameters.to,
            value: parameters.value,
            transactions_per_account: parameters.transactions_per_account,
            execution_time_seconds: (finished_at - started_at).num_seconds().max(0) as u64,
            block_production_time_seconds: timestamps.production_time_seconds(),
            initial_block_number: stats.initial_block_number,
            final_block_number: stats.final_block_number,
            initial_block_timestamp: timestamps.first,
            final_block_timestamp: timestamps.last,
            average_gas_used: stats.average_gas_used(),
            average_gas_price: stats.average_gas_price(),
            total_gas_used: stats.total_gas_used,
            total_gas_price: stats.total_gas_price,
            total_transactions_sent: transactions.len(),
            total_transactions_mined: stats.mined,
            accounts,
            transactions,
            failures,
        }
    }
}

/// Builds the report, looking up the timestamps of the first and last mined
/// blocks. A failed lookup leaves that timestamp empty and is recorded as a
/// failure instead of failing the report.
#[tracing::instrument(skip_all, fields(chain_id = chain.chain_id(), results = transactions.len()))]
pub async fn aggregate_performance<C: ChainClient>(
    chain: &C,
    parameters: &RunParameters,
    accounts: Vec<Address>,
    transactions: Vec<TransactionResult>,
    mut failures: Vec<BatchFailure>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> ChainPerformance {
    let stats = MinedStatistics::from_results(&transactions);

    let mut timestamps = BlockTimestamps::default();
    if let (Some(initial), Some(last)) = (stats.initial_block_number, stats.final_block_number) {
        timestamps.first = lookup_block_time(chain, initial, &mut failures).await;
        timestamps.last = if last == initial {
            timestamps.first
        } else {
            lookup_block_time(chain, last, &mut failures).await
        };
    } else {
        tracing::warn!("No transactions were mined, block span is empty");
    }

    let performance = ChainPerformance::from_parts(
        parameters,
        accounts,
        transactions,
        failures,
        timestamps,
        started_at,
        finished_at,
    );

    tracing::info!(
        sent = performance.total_transactions_sent,
        mined = performance.total_transactions_mined,
        initial_block = ?performance.initial_block_number,
        final_block = ?performance.final_block_number,
        average_gas_used = %performance.average_gas_used,
        average_gas_price = %performance.average_gas_price,
        "Aggregated chain performance"
    );

    performance
}

async fn lookup_block_time<C: ChainClient>(
    chain: &C,
    block_number: u64,
    failures: &mut Vec<BatchFailure>,
) -> Option<DateTime<Utc>> {
    let error = match chain.block_timestamp(block_number).await {
        Ok(Some(timestamp)) => match DateTime::from_timestamp(timestamp as i64, 0) {
            Some(time) => return Some(time),
            None => ExecutorError::BlockLookupFailed {
                block_number,
                message: format!("Timestamp {timestamp} is out of range"),
                inner_error: None,
            },
        },
        Ok(None) => ExecutorError::BlockLookupFailed {
            block_number,
            message: "Block not found".to_string(),
            inner_error: None,
        },
        Err(e) => ExecutorError::BlockLookupFailed {
            block_number,
            message: e.to_string(),
            inner_error: Some(e),
        },
    };

    tracing::warn!(block_number = block_number, error = %error, "Block timestamp lookup failed");
    failures.push(BatchFailure {
        stage: FailureStage::BlockLookup,
        from: None,
        nonce: None,
        hash: None,
        error,
    });
    None
}

#[cfg(test)]
mod tests {
    use alloy::primitives::TxHash;

    use super::*;

    fn mined(from: u8, nonce: u64, gas_used: u64, gas_price: u128, block: u64) -> TransactionResult {
        TransactionResult {
            hash: TxHash::repeat_byte(nonce as u8),
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1,
            nonce,
            from: Address::repeat_byte(from),
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            gas_used: Some(gas_used),
            gas_price: Some(gas_price),
            block_number: Some(block),
        }
    }

    fn unmined(from: u8, nonce: u64) -> TransactionResult {
        TransactionResult {
            gas_used: None,
            gas_price: None,
            block_number: None,
            ..mined(from, nonce, 0, 0, 0)
        }
    }

    fn parameters() -> RunParameters {
        RunParameters {
            rpc_endpoint: "http://localhost:8545".to_string(),
            calldata: Bytes::new(),
            to: Address::ZERO,
            value: U256::ZERO,
            transactions_per_account: 1,
        }
    }

    #[test]
    fn statistics_skip_unmined_results() {
        let results = vec![
            mined(1, 0, 21_000, 1_000_000_000, 12),
            unmined(1, 1),
            mined(2, 0, 42_000, 3_000_000_000, 10),
        ];

        let stats = MinedStatistics::from_results(&results);
        assert_eq!(stats.mined, 2);
        assert_eq!(stats.initial_block_number, Some(10));
        assert_eq!(stats.final_block_number, Some(12));
        assert_eq!(stats.total_gas_used, 63_000);
        assert_eq!(stats.average_gas_used(), 31_500);
        assert_eq!(stats.average_gas_price(), 2_000_000_000);
    }

    #[test]
    fn nothing_mined_reports_zeroes() {
        let stats = MinedStatistics::from_results(&[unmined(1, 0), unmined(1, 1)]);
        assert_eq!(stats.mined, 0);
        assert_eq!(stats.average_gas_used(), 0);
        assert_eq!(stats.average_gas_price(), 0);
        assert_eq!(stats.initial_block_number, None);

        let now = Utc::now();
        let report = ChainPerformance::from_parts(
            &parameters(),
            vec![Address::repeat_byte(1)],
            vec![unmined(1, 1), unmined(1, 0)],
            Vec::new(),
            BlockTimestamps::default(),
            now,
            now,
        );
        assert_eq!(report.total_transactions_sent, 2);
        assert_eq!(report.total_transactions_mined, 0);
        assert_eq!(report.block_production_time_seconds, 0);
        assert_eq!(report.initial_block_timestamp, None);
        assert_eq!(report.transactions[0].nonce, 0);
    }

    #[test]
    fn production_time_spans_boundary_blocks() {
        let timestamps = BlockTimestamps {
            first: DateTime::from_timestamp(1_700_000_000, 0),
            last: DateTime::from_timestamp(1_700_000_012, 0),
        };
        assert_eq!(timestamps.production_time_seconds(), 12);

        let partial = BlockTimestamps {
            first: DateTime::from_timestamp(1_700_000_000, 0),
            last: None,
        };
        assert_eq!(partial.production_time_seconds(), 0);
    }

    #[test]
    fn report_serializes_amounts_as_strings() {
        let started_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let report = ChainPerformance::from_parts(
            &parameters(),
            vec![Address::repeat_byte(1)],
            vec![mined(1, 0, 21_000, 1_000_000_000, 5)],
            Vec::new(),
            BlockTimestamps::default(),
            started_at,
            started_at + chrono::Duration::seconds(3),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["averageGasPrice"], "1000000000");
        assert_eq!(json["totalGasUsed"], "21000");
        assert_eq!(json["executionTimeSeconds"], 3);
        assert_eq!(json["initialBlockNumber"], 5);
        assert_eq!(json["totalTransactionsMined"], 1);
    }
}
