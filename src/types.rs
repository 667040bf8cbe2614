// Core data model shared by the detection and response pipeline.
// Everything here is immutable once produced by its stage, except
// ResponseRecord, which only the response registry mutates.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Gas parameters of an observed transaction (legacy or EIP-1559).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasParams {
    pub gas_limit: u64,
    /// Legacy / EIP-2930 gas price
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// A transaction observed in the pending pool, as returned by the ChainReader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub from: Address,
    /// None for contract creation
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub gas: GasParams,
    /// Set once the node reports the tx inside a block (no longer pending)
    pub block_number: Option<u64>,
}

impl PendingTransaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }
}

/// Call shapes the heuristics recognize in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCall {
    Unknown,
    Liquidate {
        collateral: Address,
        user: Address,
        debt_to_cover: U256,
    },
    LargeValueTransfer {
        value: U256,
    },
}

impl DecodedCall {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Liquidate { .. } => "liquidate",
            Self::LargeValueTransfer { .. } => "large-value-transfer",
        }
    }
}

/// Heuristic verdict, produced once per pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Benign,
    Suspicious {
        /// Names of every rule that fired, joined with '+'
        reason: String,
        extracted: DecodedCall,
    },
}

impl Verdict {
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::Suspicious { .. })
    }
}

/// Well-known derived parameter names.
pub mod params {
    pub const COLLATERAL: &str = "collateral";
    pub const USER: &str = "user";
    pub const DEBT_TO_COVER: &str = "debtToCover";
    pub const POOL: &str = "pool";
    pub const VALUE: &str = "value";
    pub const SENDER: &str = "sender";
    pub const RECIPIENT: &str = "recipient";
}

/// Outcome of replaying a candidate against current chain state.
///
/// Reflects state at the time of simulation, which may differ from the state
/// the transaction was observed against.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub accepted: bool,
    pub revert_reason: Option<String>,
    pub derived_parameters: BTreeMap<String, DynSolValue>,
}

impl SimulationResult {
    pub fn accepted(derived_parameters: BTreeMap<String, DynSolValue>) -> Self {
        Self {
            accepted: true,
            revert_reason: None,
            derived_parameters,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            revert_reason: Some(reason.into()),
            derived_parameters: BTreeMap::new(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&DynSolValue> {
        self.derived_parameters.get(name)
    }
}

/// Lifecycle of a submitted countermeasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResponseStatus::Pending => write!(f, "pending"),
            ResponseStatus::Confirmed => write!(f, "confirmed"),
            ResponseStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One record per distinct triggering transaction, for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub triggering_tx_hash: TxHash,
    pub submitted_at: DateTime<Utc>,
    /// None until the signing collaborator returns a hash
    pub response_tx_hash: Option<TxHash>,
    pub status: ResponseStatus,
    /// Dispatch attempts for this trigger (max 2: first dispatch + one re-attempt)
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ResponseRecord {
    pub fn new_pending(triggering_tx_hash: TxHash) -> Self {
        Self {
            triggering_tx_hash,
            submitted_at: Utc::now(),
            response_tx_hash: None,
            status: ResponseStatus::Pending,
            attempts: 1,
            last_error: None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.status == ResponseStatus::Pending
    }
}
