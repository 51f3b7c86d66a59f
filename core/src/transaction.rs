use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// A funded profiling account, identified by address only.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account {
    pub address: Address,
}

/// Sparse per-submission overrides. Missing fields are filled from the network
/// when the transaction is built.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOptions {
    /// Maximum fee per gas willing to pay (in wei)
    pub max_fee_per_gas: Option<u128>,

    /// Maximum priority fee per gas willing to pay (in wei)
    pub max_priority_fee_per_gas: Option<u128>,

    /// Explicit nonce; the pending nonce is fetched when absent
    pub nonce: Option<u64>,
}

impl TransactionOptions {
    pub fn with_nonce(nonce: u64) -> Self {
        Self {
            nonce: Some(nonce),
            ..Default::default()
        }
    }

    pub fn with_fees(max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            nonce: None,
        }
    }
}

/// What to send: destination, value and call data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCall {
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
}

/// One submitted transaction and, once mined, its realized cost.
///
/// `hash`, `from`, `to`, `nonce` and `created_at` are fixed at submission.
/// `gas_used`, `gas_price` and `block_number` stay `None` until the transaction
/// is observed in a block.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub hash: TxHash,
    #[serde_as(as = "DisplayFromStr")]
    pub max_fee_per_gas: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub max_priority_fee_per_gas: u128,
    pub nonce: u64,
    pub from: Address,
    pub to: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub value: U256,
    pub data: Bytes,
    pub created_at: DateTime<Utc>,
    pub gas_used: Option<u64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub gas_price: Option<u128>,
    pub block_number: Option<u64>,
}

impl TransactionResult {
    pub fn is_mined(&self) -> bool {
        self.gas_used.is_some() && self.gas_price.is_some() && self.block_number.is_some()
    }

    /// Records the realized cost from `receipt`. Returns `false` (and leaves the
    /// result untouched) if cost fields were already recorded.
    pub fn apply_receipt(&mut self, receipt: &ReceiptSummary) -> bool {
        if self.is_mined() {
            return false;
        }

        self.gas_used = Some(receipt.gas_used);
        self.gas_price = Some(receipt.effective_gas_price);
        self.block_number = Some(receipt.block_number);
        true
    }
}

/// The subset of a transaction receipt the profiler cares about.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptSummary {
    pub transaction_hash: TxHash,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub block_number: u64,
    /// Execution status; reverted transactions are still mined and still paid for.
    pub success: bool,
}
