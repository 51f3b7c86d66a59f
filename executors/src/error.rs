use alloy::primitives::{Address, TxHash};
use chainprof_core::error::ChainError;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "errorCode")]
pub enum ExecutorError {
    #[error("Failed to reserve nonces for {address}: {message}")]
    NonceReservationFailed {
        address: Address,
        message: String,
        inner_error: ChainError,
    },

    #[error("Gas estimation failed: {message}")]
    GasEstimationFailed {
        message: String,
        inner_error: ChainError,
    },

    #[error("Fee suggestion failed: {message}")]
    FeeSuggestionFailed {
        message: String,
        inner_error: ChainError,
    },

    #[error("Transaction build failed: {message}")]
    TransactionBuildFailed { message: String },

    #[error("Transaction signing failed: {message}")]
    SigningError { message: String },

    #[error("Error encountered when broadcasting transaction: {message}")]
    TransactionSendError {
        message: String,
        classification: SendErrorClassification,
        inner_error: ChainError,
    },

    #[error("Failed to fetch receipt for {hash}: {message}")]
    ReceiptError {
        hash: TxHash,
        message: String,
        inner_error: ChainError,
    },

    #[error("Transaction {hash} not mined within {waited_ms}ms")]
    ReceiptTimeout { hash: TxHash, waited_ms: u64 },

    #[error("Failed to look up block {block_number}: {message}")]
    BlockLookupFailed {
        block_number: u64,
        message: String,
        inner_error: Option<ChainError>,
    },

    #[error("Failed to read balance of {address}: {message}")]
    BalanceLookupFailed {
        address: Address,
        message: String,
        inner_error: Option<ChainError>,
    },

    #[error("Account setup failed: {message}")]
    AccountSetupFailed {
        message: String,
        inner_error: ChainError,
    },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ExecutorError {
    /// Errors that abort a whole run rather than a single transaction.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            ExecutorError::NonceReservationFailed { .. }
                | ExecutorError::AccountSetupFailed { .. }
                | ExecutorError::InternalError { .. }
        )
    }
}

/// Whether a rejected broadcast may still have reached the mempool.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendErrorClassification {
    /// The node may hold the transaction; it can still be mined.
    PossiblySent,
    /// The node rejected the transaction outright.
    DeterministicFailure,
}

pub fn classify_send_error(error: &ChainError) -> SendErrorClassification {
    if !error.is_error_response() {
        return SendErrorClassification::DeterministicFailure;
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("invalid signature")
        || error_str.contains("malformed transaction")
        || error_str.contains("insufficient funds")
        || error_str.contains("invalid transaction format")
        || error_str.contains("nonce too high")
    {
        return SendErrorClassification::DeterministicFailure;
    }

    if error_str.contains("nonce too low")
        || error_str.contains("already known")
        || error_str.contains("replacement transaction underpriced")
        || error_str.contains("transaction already imported")
    {
        return SendErrorClassification::PossiblySent;
    }

    if error_str.contains("malformed")
        || error_str.contains("gas limit")
        || error_str.contains("intrinsic gas too low")
        || error_str.contains("oversized")
    {
        return SendErrorClassification::DeterministicFailure;
    }

    tracing::warn!(error = %error_str, "Unclassified send error, assuming it may have been sent");

    SendErrorClassification::PossiblySent
}
