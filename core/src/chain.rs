use std::future::Future;

use alloy::{
    consensus::TxEnvelope,
    eips::BlockNumberOrTag,
    network::ReceiptResponse,
    primitives::{Address, Bytes, TxHash, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    transports::http::reqwest::Url,
};

use crate::{
    error::{AlloyRpcErrorToChainError, ChainError},
    transaction::ReceiptSummary,
};

/// The chain endpoint as seen by the batch engine.
///
/// Implementations must be safe to share across every concurrently running send
/// and wait task; the engine adds no locking of its own.
pub trait ChainClient: Send + Sync + 'static {
    fn chain_id(&self) -> u64;
    fn rpc_url(&self) -> Url;

    /// Nonce of the next transaction for `address`, counting the mempool.
    fn pending_nonce(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn estimate_gas(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn call(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// Suggested fee cap per gas, in wei.
    fn gas_price(&self) -> impl Future<Output = Result<u128, ChainError>> + Send;

    /// Suggested priority fee (tip) per gas, in wei.
    fn max_priority_fee_per_gas(&self) -> impl Future<Output = Result<u128, ChainError>> + Send;

    fn send_transaction(
        &self,
        envelope: TxEnvelope,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// `Ok(None)` while the transaction is still pending.
    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<ReceiptSummary>, ChainError>> + Send;

    /// Unix timestamp (seconds) of block `number`, `Ok(None)` if the block is unknown.
    fn block_timestamp(
        &self,
        number: u64,
    ) -> impl Future<Output = Result<Option<u64>, ChainError>> + Send;
}

pub struct RpcChainConfig<'a> {
    pub rpc_url: &'a str,
}

/// JSON-RPC over HTTP chain client
#[derive(Clone, Debug)]
pub struct RpcChain {
    chain_id: u64,
    rpc_url: Url,
    pub provider: RootProvider,
}

impl RpcChainConfig<'_> {
    /// Builds the provider and resolves the chain id. An unreachable endpoint
    /// fails here, before any transaction is attempted.
    pub async fn connect(&self) -> Result<RpcChain, ChainError> {
        let rpc_url = Url::parse(self.rpc_url).map_err(|e| ChainError::RpcConfigError {
            message: format!("Failed to parse RPC URL {}: {e}", self.rpc_url),
        })?;

        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(rpc_url.clone());

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::RpcConfigError {
                message: format!("Failed to fetch chain id from {rpc_url}: {e}"),
            })?;

        tracing::debug!(chain_id = chain_id, rpc_url = %rpc_url, "Connected to chain endpoint");

        Ok(RpcChain {
            chain_id,
            rpc_url,
            provider,
        })
    }
}

impl ChainClient for RpcChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn rpc_url(&self) -> Url {
        self.rpc_url.clone()
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| e.to_chain_error(self))
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| e.to_chain_error(self))
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, ChainError> {
        self.provider
            .estimate_gas(request)
            .await
            .map_err(|e| e.to_chain_error(self))
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError> {
        self.provider
            .call(request)
            .await
            .map_err(|e| e.to_chain_error(self))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| e.to_chain_error(self))
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128, ChainError> {
        self.provider
            .get_max_priority_fee_per_gas()
            .await
            .map_err(|e| e.to_chain_error(self))
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> Result<TxHash, ChainError> {
        self.provider
            .send_tx_envelope(envelope)
            .await
            .map(|pending| *pending.tx_hash())
            .map_err(|e| e.to_chain_error(self))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| e.to_chain_error(self))?;

        // a receipt without a block number has not been included yet
        Ok(receipt.and_then(|receipt| {
            let block_number = receipt.block_number?;
            Some(ReceiptSummary {
                transaction_hash: receipt.transaction_hash,
                gas_used: receipt.gas_used,
                effective_gas_price: receipt.effective_gas_price,
                block_number,
                success: receipt.status(),
            })
        }))
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| e.to_chain_error(self))?;

        Ok(block.map(|block| block.header.timestamp))
    }
}
