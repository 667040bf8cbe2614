//! Response Submitter
//!
//! Purpose:
//!     The signing seam. Wraps an encoded payload in `executeBytes(bytes)`,
//!     signs and broadcasts it to the response contract, and polls for the
//!     receipt. The signing key never leaves the wallet-filled provider.
//!
//! Created: 2026-10-05
//!
//! Implementations:
//!     - RpcSubmitter   — live broadcast through a wallet-filled provider
//!     - DryRunSubmitter — logs what would be sent, broadcasts nothing

use crate::contracts::IResponseContract;
use crate::error::SubmissionError;
use alloy::network::TransactionBuilder;
use alloy::primitives::{keccak256, Address, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[async_trait]
pub trait ResponseSubmitter: Send + Sync {
    /// Sign and broadcast `executeBytes(payload)`, returning the response tx hash.
    async fn submit(&self, payload: Bytes, gas_limit: u64) -> Result<TxHash, SubmissionError>;

    /// Wait for inclusion. Ok(true) = succeeded, Ok(false) = reverted on-chain.
    async fn await_confirmation(&self, response_tx: TxHash, timeout: Duration) -> Result<bool, SubmissionError>;

    /// False when `submit` only records what would have been sent.
    fn broadcasts(&self) -> bool {
        true
    }
}

/// ABI calldata for the response contract entrypoint.
pub fn execute_bytes_calldata(payload: Bytes) -> Bytes {
    IResponseContract::executeBytesCall { data: payload }.abi_encode().into()
}

pub struct RpcSubmitter {
    provider: DynProvider,
    contract: Address,
    poll_interval: Duration,
}

impl RpcSubmitter {
    /// `provider` must carry the signing wallet filler.
    pub fn new(provider: DynProvider, contract: Address) -> Self {
        Self {
            provider,
            contract,
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl ResponseSubmitter for RpcSubmitter {
    async fn submit(&self, payload: Bytes, gas_limit: u64) -> Result<TxHash, SubmissionError> {
        let request = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(execute_bytes_calldata(payload))
            .with_gas_limit(gas_limit);

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(classify_send_error)?;
        Ok(*pending.tx_hash())
    }

    async fn await_confirmation(&self, response_tx: TxHash, timeout: Duration) -> Result<bool, SubmissionError> {
        let deadline = Instant::now() + timeout;
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.provider.get_transaction_receipt(response_tx).await {
                Ok(Some(receipt)) => return Ok(receipt.status()),
                Ok(None) => {}
                Err(e) => debug!(tx = %response_tx, error = %e, "receipt poll failed"),
            }
            if Instant::now() >= deadline {
                return Err(SubmissionError::TimedOut(timeout));
            }
        }
    }
}

/// A rejected send that carries revert data is final; everything else may be retried.
pub fn classify_send_error(err: TransportError) -> SubmissionError {
    if let Some(payload) = err.as_error_resp() {
        if payload.as_revert_data().is_some() || payload.message.to_lowercase().contains("revert") {
            return SubmissionError::Reverted(payload.message.to_string());
        }
    }
    SubmissionError::Transient(err.to_string())
}

/// Logs the response it would send. Used until a live key is configured.
pub struct DryRunSubmitter {
    contract: Address,
    sent: AtomicU64,
}

impl DryRunSubmitter {
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            sent: AtomicU64::new(0),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResponseSubmitter for DryRunSubmitter {
    async fn submit(&self, payload: Bytes, gas_limit: u64) -> Result<TxHash, SubmissionError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed);
        let calldata = execute_bytes_calldata(payload);
        let mut preimage = calldata.to_vec();
        preimage.extend_from_slice(&n.to_be_bytes());
        let pseudo_hash = keccak256(preimage);

        info!(
            contract = %self.contract,
            gas_limit,
            calldata = %calldata,
            pseudo_hash = %pseudo_hash,
            "DRY RUN | would submit executeBytes"
        );
        Ok(pseudo_hash)
    }

    /// Nothing was broadcast, so nothing is ever included.
    async fn await_confirmation(&self, _response_tx: TxHash, _timeout: Duration) -> Result<bool, SubmissionError> {
        Ok(false)
    }

    fn broadcasts(&self) -> bool {
        false
    }
}
