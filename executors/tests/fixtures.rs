#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use chainprof_core::chain::ChainClient;
use chainprof_core::error::{ChainError, RpcErrorKind, RpcErrorResponse};
use chainprof_core::keystore::ProfilingAccount;
use chainprof_core::transaction::ReceiptSummary;
use chainprof_executors::batch::BatchConfig;

pub const CHAIN_ID: u64 = 31337;
pub const GAS_PRICE: u128 = 1_000_000_000;
pub const PRIORITY_FEE: u128 = 1_000_000;
pub const TRANSFER_GAS: u64 = 21_000;
pub const CALL_GAS: u64 = 50_000;
pub const FIRST_BLOCK: u64 = 100;
pub const TXS_PER_BLOCK: u64 = 2;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 2;

/// A transaction as the mock endpoint received it.
#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub hash: TxHash,
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: Option<u128>,
    pub block_number: u64,
}

#[derive(Default)]
struct MockState {
    pending_nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    token_balances: HashMap<Address, U256>,
    failing_broadcast_nonces: HashSet<u64>,
    never_mined_nonces: HashSet<u64>,
    failing_nonce_queries: bool,
    failing_receipts: bool,
    misreported_receipt_hashes: bool,
    sent: Vec<SentTransaction>,
    receipt_polls: HashMap<TxHash, u32>,
}

/// In-memory chain endpoint with failure injection.
pub struct MockChain {
    state: Mutex<MockState>,
    send_delay: Duration,
    polls_before_mined: u32,
    in_flight_sends: AtomicUsize,
    max_in_flight_sends: AtomicUsize,
    block_lookups: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            send_delay: Duration::ZERO,
            polls_before_mined: 0,
            in_flight_sends: AtomicUsize::new(0),
            max_in_flight_sends: AtomicUsize::new(0),
            block_lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_pending_nonce(self, address: Address, nonce: u64) -> Self {
        self.state.lock().unwrap().pending_nonces.insert(address, nonce);
        self
    }

    pub fn with_balance(self, address: Address, balance: U256) -> Self {
        self.state.lock().unwrap().balances.insert(address, balance);
        self
    }

    pub fn with_token_balance(self, address: Address, balance: U256) -> Self {
        self.state
            .lock()
            .unwrap()
            .token_balances
            .insert(address, balance);
        self
    }

    /// Rejects any broadcast carrying `nonce`.
    pub fn fail_broadcast_for_nonce(self, nonce: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_broadcast_nonces
            .insert(nonce);
        self
    }

    /// Accepts transactions with `nonce` but never mines them.
    pub fn never_mine_nonce(self, nonce: u64) -> Self {
        self.state.lock().unwrap().never_mined_nonces.insert(nonce);
        self
    }

    pub fn failing_nonce_queries(self) -> Self {
        self.state.lock().unwrap().failing_nonce_queries = true;
        self
    }

    pub fn failing_receipts(self) -> Self {
        self.state.lock().unwrap().failing_receipts = true;
        self
    }

    /// Every receipt reports the same unrelated transaction hash.
    pub fn misreporting_receipt_hashes(self) -> Self {
        self.state.lock().unwrap().misreported_receipt_hashes = true;
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Number of receipt polls answered with "pending" before a receipt appears.
    pub fn with_polls_before_mined(mut self, polls: u32) -> Self {
        self.polls_before_mined = polls;
        self
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.max_in_flight_sends.load(Ordering::SeqCst)
    }

    pub fn block_lookups(&self) -> usize {
        self.block_lookups.load(Ordering::SeqCst)
    }

    fn rpc_error(&self, message: &str) -> ChainError {
        ChainError::RpcError {
            chain_id: CHAIN_ID,
            rpc_url: self.rpc_url().to_string(),
            message: message.to_string(),
            kind: RpcErrorKind::ErrorResp(RpcErrorResponse {
                code: -32000,
                message: message.to_string(),
                data: None,
            }),
        }
    }
}

impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    fn rpc_url(&self) -> Url {
        Url::parse("http://localhost:8545").unwrap()
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.failing_nonce_queries {
            return Err(ChainError::RpcError {
                chain_id: CHAIN_ID,
                rpc_url: "http://localhost:8545/".to_string(),
                message: "connection refused".to_string(),
                kind: RpcErrorKind::OtherTransportError {
                    message: "connection refused".to_string(),
                },
            });
        }
        Ok(state.pending_nonces.get(&address).copied().unwrap_or(0))
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, ChainError> {
        let has_input = request
            .input
            .input()
            .is_some_and(|input| !input.is_empty());
        Ok(if has_input { CALL_GAS } else { TRANSFER_GAS })
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError> {
        let input = request.input.input().cloned().unwrap_or_default();
        if input.len() < 36 {
            return Err(self.rpc_error("execution reverted"));
        }
        // balanceOf(address): selector followed by one left-padded address word
        let owner = Address::from_slice(&input[16..36]);
        let state = self.state.lock().unwrap();
        let balance = state.token_balances.get(&owner).copied().unwrap_or_default();
        Ok(Bytes::from(balance.to_be_bytes::<32>().to_vec()))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(GAS_PRICE)
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128, ChainError> {
        Ok(PRIORITY_FEE)
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> Result<TxHash, ChainError> {
        let in_flight = self.in_flight_sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_sends.fetch_max(in_flight, Ordering::SeqCst);

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.in_flight_sends.fetch_sub(1, Ordering::SeqCst);

        let hash = *envelope.tx_hash();
        let nonce = envelope.nonce();

        let mut state = self.state.lock().unwrap();
        if state.failing_broadcast_nonces.contains(&nonce) {
            return Err(self.rpc_error("insufficient funds for gas * price + value"));
        }

        let block_number = FIRST_BLOCK + state.sent.len() as u64 / TXS_PER_BLOCK;
        state.sent.push(SentTransaction {
            hash,
            nonce,
            to: envelope.to(),
            value: envelope.value(),
            input: envelope.input().clone(),
            gas_limit: envelope.gas_limit(),
            max_fee_per_gas: envelope.max_fee_per_gas(),
            max_priority_fee_per_gas: envelope.max_priority_fee_per_gas(),
            block_number,
        });

        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_receipts {
            return Err(self.rpc_error("header not found"));
        }

        let Some(sent) = state.sent.iter().find(|tx| tx.hash == hash).cloned() else {
            return Ok(None);
        };
        if state.never_mined_nonces.contains(&sent.nonce) {
            return Ok(None);
        }

        let polls = state.receipt_polls.entry(hash).or_insert(0);
        if *polls < self.polls_before_mined {
            *polls += 1;
            return Ok(None);
        }

        let transaction_hash = if state.misreported_receipt_hashes {
            TxHash::repeat_byte(0xff)
        } else {
            hash
        };

        Ok(Some(ReceiptSummary {
            transaction_hash,
            gas_used: sent.gas_limit,
            effective_gas_price: GAS_PRICE,
            block_number: sent.block_number,
            success: true,
        }))
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, ChainError> {
        self.block_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Some(GENESIS_TIMESTAMP + number * BLOCK_TIME))
    }
}

pub fn random_accounts(count: usize) -> Vec<ProfilingAccount> {
    (0..count)
        .map(|_| ProfilingAccount::new(PrivateKeySigner::random()))
        .collect()
}

pub fn fast_config() -> BatchConfig {
    BatchConfig {
        receipt_poll_interval: Duration::from_millis(5),
        ..BatchConfig::default()
    }
}

// Setup tracing for tests
pub fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "chainprof_executors=debug,chainprof_core=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
