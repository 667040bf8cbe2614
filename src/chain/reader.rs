//! Chain Reader
//!
//! Purpose:
//!     Read-only access to ledger state and pending transaction content.
//!     The trait is the seam the pipeline depends on; RpcChainReader is the
//!     JSON-RPC implementation over any alloy provider.
//!
//! Created: 2026-10-02
//!
//! Error classification:
//!     - get_transaction_by_hash → None             ⇒ NotFound
//!     - eth_call error response with revert data   ⇒ Revert(decoded reason)
//!     - eth_call error response "execution reverted" ⇒ Revert(message)
//!     - anything else from the transport           ⇒ Unavailable

use crate::error::ChainError;
use crate::types::{GasParams, PendingTransaction};
use alloy::consensus::Transaction as TransactionTrait;
use alloy::eips::BlockId;
use alloy::network::{TransactionBuilder, TransactionResponse};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::decode_revert_reason;
use alloy::transports::TransportError;
use async_trait::async_trait;
use tracing::trace;

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Look up a transaction by hash. `NotFound` if the node no longer knows it.
    async fn fetch_transaction(&self, hash: TxHash) -> Result<PendingTransaction, ChainError>;

    /// Re-execute a transaction read-only against the given state view.
    async fn call(&self, tx: &PendingTransaction, at: BlockId) -> Result<Bytes, ChainError>;

    /// Read contract state: `calldata` is a fully encoded view call.
    async fn read_contract_state(&self, address: Address, calldata: Bytes) -> Result<Bytes, ChainError>;
}

/// ChainReader backed by a JSON-RPC provider.
#[derive(Clone)]
pub struct RpcChainReader {
    provider: DynProvider,
}

impl RpcChainReader {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn fetch_transaction(&self, hash: TxHash) -> Result<PendingTransaction, ChainError> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;
        tx.map(map_tx).ok_or(ChainError::NotFound)
    }

    async fn call(&self, tx: &PendingTransaction, at: BlockId) -> Result<Bytes, ChainError> {
        trace!(tx = %tx.hash, "eth_call replay");
        self.provider
            .call(replay_request(tx))
            .block(at)
            .await
            .map_err(classify_call_error)
    }

    async fn read_contract_state(&self, address: Address, calldata: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default()
            .with_to(address)
            .with_input(calldata);
        self.provider
            .call(request)
            .block(BlockId::latest())
            .await
            .map_err(classify_call_error)
    }
}

/// Map an RPC transaction into our immutable snapshot.
fn map_tx<T>(tx: T) -> PendingTransaction
where
    T: TransactionTrait + TransactionResponse,
{
    let legacy_pricing = tx.is_legacy() || tx.is_eip2930();
    PendingTransaction {
        hash: TransactionResponse::tx_hash(&tx),
        from: TransactionResponse::from(&tx),
        to: TransactionTrait::to(&tx),
        input: TransactionTrait::input(&tx).clone(),
        value: TransactionTrait::value(&tx),
        nonce: TransactionTrait::nonce(&tx),
        gas: GasParams {
            gas_limit: TransactionTrait::gas_limit(&tx),
            gas_price: TransactionTrait::gas_price(&tx),
            max_fee_per_gas: (!legacy_pricing).then(|| TransactionTrait::max_fee_per_gas(&tx)),
            max_priority_fee_per_gas: TransactionTrait::max_priority_fee_per_gas(&tx),
        },
        block_number: TransactionResponse::block_number(&tx),
    }
}

/// Build an eth_call request that replays the observed transaction exactly.
pub fn replay_request(tx: &PendingTransaction) -> TransactionRequest {
    let mut request = TransactionRequest::default()
        .with_from(tx.from)
        .with_input(tx.input.clone())
        .with_value(tx.value)
        .with_gas_limit(tx.gas.gas_limit);

    if let Some(to) = tx.to {
        request = request.with_to(to);
    }

    match (tx.gas.max_fee_per_gas, tx.gas.gas_price) {
        (Some(max_fee), _) => {
            request = request.with_max_fee_per_gas(max_fee);
            if let Some(tip) = tx.gas.max_priority_fee_per_gas {
                request = request.with_max_priority_fee_per_gas(tip);
            }
        }
        (None, Some(gas_price)) => {
            request = request.with_gas_price(gas_price);
        }
        (None, None) => {}
    }

    request
}

/// Separate informative reverts from transient infrastructure failures.
pub fn classify_call_error(err: TransportError) -> ChainError {
    if let Some(payload) = err.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            let reason = decode_revert_reason(&data).or_else(|| Some(payload.message.to_string()));
            return ChainError::Revert(reason);
        }
        if payload.message.to_lowercase().contains("revert") {
            return ChainError::Revert(Some(payload.message.to_string()));
        }
        return ChainError::Unavailable(format!("rpc error {}: {}", payload.code, payload.message));
    }
    ChainError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, hash, pending_tx};
    use alloy::primitives::U256;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::{RpcError, TransportErrorKind};

    fn error_resp(code: i64, message: &str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.to_string().into(),
            data: None,
        })
    }

    #[test]
    fn test_execution_reverted_is_revert() {
        let err = classify_call_error(error_resp(3, "execution reverted: HEALTH_FACTOR_OK"));
        assert_eq!(
            err,
            ChainError::Revert(Some("execution reverted: HEALTH_FACTOR_OK".to_string()))
        );
    }

    #[test]
    fn test_other_rpc_error_is_unavailable() {
        let err = classify_call_error(error_resp(-32005, "limit exceeded"));
        assert!(matches!(err, ChainError::Unavailable(msg) if msg.contains("limit exceeded")));
    }

    #[test]
    fn test_transport_failure_is_unavailable() {
        let err = classify_call_error(TransportErrorKind::custom_str("connection reset"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_replay_request_copies_eip1559_fields() {
        let mut tx = pending_tx(hash(1), Some(addr(0xaa)), Bytes::from(vec![1, 2, 3, 4]), U256::from(7u64));
        tx.gas.max_fee_per_gas = Some(50);
        tx.gas.max_priority_fee_per_gas = Some(2);

        let request = replay_request(&tx);
        assert_eq!(request.from, Some(tx.from));
        assert_eq!(request.value, Some(U256::from(7u64)));
        assert_eq!(request.gas, Some(tx.gas.gas_limit));
        assert_eq!(request.max_fee_per_gas, Some(50));
        assert_eq!(request.max_priority_fee_per_gas, Some(2));
        assert_eq!(request.gas_price, None);
    }

    #[test]
    fn test_replay_request_contract_creation_has_no_target() {
        let mut tx = pending_tx(hash(2), None, Bytes::new(), U256::ZERO);
        tx.gas.max_fee_per_gas = None;
        tx.gas.max_priority_fee_per_gas = None;
        tx.gas.gas_price = Some(30);
        let request = replay_request(&tx);
        assert!(request.to.is_none());
        assert_eq!(request.gas_price, Some(30));
        assert_eq!(request.max_fee_per_gas, None);
    }
}
