use std::{collections::HashSet, ops::Range, sync::Arc};

use alloy::primitives::Address;
use chainprof_core::{chain::ChainClient, error::ChainError};
use futures::future::try_join_all;

use crate::error::ExecutorError;

/// A contiguous run of nonces handed out to a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceReservation {
    pub address: Address,
    pub start: u64,
    pub count: u64,
}

impl NonceReservation {
    pub fn nonces(&self) -> Range<u64> {
        self.start..self.start + self.count
    }

    /// Nonce for the `index`-th transaction of this account, if reserved.
    pub fn nonce_at(&self, index: u64) -> Option<u64> {
        (index < self.count).then(|| self.start + index)
    }
}

/// Reserves nonce runs from the pending nonce, one query per account.
///
/// The allocator does not track anything between calls: each run starts from
/// whatever the endpoint reports as pending, so two reservations for the same
/// account must not be in flight at once. `reserve_all` enforces this within
/// one call.
pub struct NonceAllocator<C> {
    chain: Arc<C>,
}

impl<C: ChainClient> NonceAllocator<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    pub async fn reserve(&self, address: Address, count: u64) -> Result<NonceReservation, ExecutorError> {
        let start = self.chain.pending_nonce(address).await.map_err(|e| {
            ExecutorError::NonceReservationFailed {
                address,
                message: format!("Failed to fetch pending nonce: {e}"),
                inner_error: e,
            }
        })?;

        tracing::debug!(
            address = ?address,
            start_nonce = start,
            count = count,
            "Reserved nonce run"
        );

        Ok(NonceReservation {
            address,
            start,
            count,
        })
    }

    /// Reserves `count` nonces for every address concurrently. The first failure
    /// fails the whole reservation. Repeated addresses are rejected, since both
    /// copies would start from the same pending nonce.
    pub async fn reserve_all(
        &self,
        addresses: &[Address],
        count: u64,
    ) -> Result<Vec<NonceReservation>, ExecutorError> {
        let mut seen = HashSet::with_capacity(addresses.len());
        if let Some(duplicate) = addresses.iter().find(|address| !seen.insert(**address)) {
            let message = format!("Account {duplicate} is listed more than once");
            return Err(ExecutorError::AccountSetupFailed {
                message: message.clone(),
                inner_error: ChainError::ValidationError { message },
            });
        }

        try_join_all(addresses.iter().map(|address| self.reserve(*address, count))).await
    }
}
