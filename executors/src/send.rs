use std::sync::Arc;

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    network::{TransactionBuilder, TxSigner},
    primitives::{Address, Signature, TxHash, TxKind},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use chainprof_core::{
    chain::ChainClient,
    keystore::ProfilingAccount,
    transaction::{TransactionCall, TransactionOptions, TransactionResult},
};
use chrono::{DateTime, Utc};

use crate::{
    error::{ExecutorError, classify_send_error},
    metrics::{calculate_duration_seconds, current_timestamp_ms, record_transaction_sent},
};

/// Handle for a broadcast transaction, used to drive the mining wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedFees {
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
}

/// Builds, signs and broadcasts single EIP-1559 transactions.
pub struct TransactionSender<C> {
    chain: Arc<C>,
}

impl<C> Clone for TransactionSender<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
        }
    }
}

impl<C: ChainClient> TransactionSender<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Exactly one broadcast is attempted per call. Nothing is retried; any
    /// failure before or during the broadcast is returned as is.
    #[tracing::instrument(skip_all, fields(from = ?account.address(), nonce = ?options.nonce))]
    pub async fn send(
        &self,
        account: &ProfilingAccount,
        call: &TransactionCall,
        options: TransactionOptions,
    ) -> Result<(TransactionResult, SubmittedTransaction), ExecutorError> {
        let start_time = current_timestamp_ms();
        let from = account.address();

        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone());

        let gas_limit = self.chain.estimate_gas(request).await.map_err(|e| {
            ExecutorError::GasEstimationFailed {
                message: format!("Failed to estimate gas: {e}"),
                inner_error: e,
            }
        })?;

        let fees = self.resolve_fees(&options).await?;

        let nonce = match options.nonce {
            Some(nonce) => nonce,
            None => self.chain.pending_nonce(from).await.map_err(|e| {
                ExecutorError::NonceReservationFailed {
                    address: from,
                    message: format!("Failed to fetch pending nonce: {e}"),
                    inner_error: e,
                }
            })?,
        };

        let mut tx = TxEip1559 {
            chain_id: self.chain.chain_id(),
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: TxKind::Call(call.to),
            value: call.value,
            access_list: Default::default(),
            input: call.data.clone(),
        };

        let signature =
            <PrivateKeySigner as TxSigner<Signature>>::sign_transaction(account.signer(), &mut tx)
                .await
                .map_err(|e| ExecutorError::SigningError {
                    message: e.to_string(),
                })?;

        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let local_hash = *envelope.tx_hash();

        let hash = self.chain.send_transaction(envelope).await.map_err(|e| {
            let classification = classify_send_error(&e);
            ExecutorError::TransactionSendError {
                message: format!("Transaction send failed: {e}"),
                classification,
                inner_error: e,
            }
        })?;

        if hash != local_hash {
            tracing::warn!(
                local_hash = ?local_hash,
                reported_hash = ?hash,
                "Endpoint reported a different transaction hash"
            );
        }

        let submitted_at = Utc::now();
        record_transaction_sent(
            self.chain.chain_id(),
            calculate_duration_seconds(start_time, current_timestamp_ms()),
        );

        tracing::debug!(hash = ?hash, nonce = nonce, gas_limit = gas_limit, "Transaction broadcast");

        let result = TransactionResult {
            hash,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            nonce,
            from,
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            created_at: submitted_at,
            gas_used: None,
            gas_price: None,
            block_number: None,
        };

        let handle = SubmittedTransaction {
            hash,
            from,
            nonce,
            submitted_at,
        };

        Ok((result, handle))
    }

    async fn resolve_fees(&self, options: &TransactionOptions) -> Result<ResolvedFees, ExecutorError> {
        let max_fee_per_gas = match options.max_fee_per_gas {
            Some(fee) => fee,
            None => self.chain.gas_price().await.map_err(|e| {
                ExecutorError::FeeSuggestionFailed {
                    message: format!("Failed to fetch gas price: {e}"),
                    inner_error: e,
                }
            })?,
        };

        let max_priority_fee_per_gas = match options.max_priority_fee_per_gas {
            Some(fee) => fee,
            None => self.chain.max_priority_fee_per_gas().await.map_err(|e| {
                ExecutorError::FeeSuggestionFailed {
                    message: format!("Failed to fetch priority fee: {e}"),
                    inner_error: e,
                }
            })?,
        };

        if max_priority_fee_per_gas > max_fee_per_gas {
            return Err(ExecutorError::TransactionBuildFailed {
                message: format!(
                    "Priority fee {max_priority_fee_per_gas} exceeds max fee {max_fee_per_gas}"
                ),
            });
        }

        Ok(ResolvedFees {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }
}
