//! Candidate Simulator
//!
//! Purpose:
//!     Replay a suspicious pending transaction read-only against the pending
//!     state view and derive the parameters a countermeasure needs.
//!
//! Created: 2026-10-07
//! Modified: 2026-10-08 — debtToCover taken from the pool's live account data
//!
//! Steps (all inside one simulation deadline):
//!     1. eth_call the transaction at the pending block; a revert rejects it
//!     2. liquidation: read getUserAccountData(user) on the target pool and
//!        use totalDebtETH as debtToCover
//!     3. emit derived parameters keyed by name
//!
//! Never signs or submits anything.

use crate::chain::ChainReader;
use crate::contracts::ILendingPool;
use crate::error::SimulationError;
use crate::types::{params, DecodedCall, PendingTransaction, SimulationResult, Verdict};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::BlockId;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

pub struct Simulator<R> {
    reader: Arc<R>,
    timeout: Duration,
}

impl<R: ChainReader> Simulator<R> {
    pub fn new(reader: Arc<R>, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    pub async fn simulate(
        &self,
        tx: &PendingTransaction,
        verdict: &Verdict,
    ) -> Result<SimulationResult, SimulationError> {
        let extracted = match verdict {
            Verdict::Suspicious { extracted, .. } => extracted,
            Verdict::Benign => {
                return Err(SimulationError::Failed {
                    reason: Some("benign transactions are not simulated".to_string()),
                })
            }
        };

        match timeout(self.timeout, self.replay(tx, extracted)).await {
            Ok(result) => result,
            Err(_) => Err(SimulationError::Timeout(self.timeout)),
        }
    }

    async fn replay(
        &self,
        tx: &PendingTransaction,
        extracted: &DecodedCall,
    ) -> Result<SimulationResult, SimulationError> {
        let output = self.reader.call(tx, BlockId::pending()).await?;
        debug!(tx = %tx.hash, output_len = output.len(), "replay succeeded");

        let mut derived = BTreeMap::new();
        match extracted {
            DecodedCall::Liquidate { collateral, user, .. } => {
                let pool = tx.to.ok_or_else(|| SimulationError::Failed {
                    reason: Some("liquidation without a target pool".to_string()),
                })?;
                let debt = self.outstanding_debt(pool, *user).await?;
                derived.insert(params::COLLATERAL.to_string(), DynSolValue::Address(*collateral));
                derived.insert(params::USER.to_string(), DynSolValue::Address(*user));
                derived.insert(params::DEBT_TO_COVER.to_string(), DynSolValue::Uint(debt, 256));
                derived.insert(params::POOL.to_string(), DynSolValue::Address(pool));
            }
            DecodedCall::LargeValueTransfer { value } => {
                derived.insert(params::VALUE.to_string(), DynSolValue::Uint(*value, 256));
                derived.insert(params::SENDER.to_string(), DynSolValue::Address(tx.from));
                if let Some(to) = tx.to {
                    derived.insert(params::RECIPIENT.to_string(), DynSolValue::Address(to));
                }
            }
            DecodedCall::Unknown => {}
        }

        Ok(SimulationResult::accepted(derived))
    }

    async fn outstanding_debt(&self, pool: Address, user: Address) -> Result<U256, SimulationError> {
        let calldata = ILendingPool::getUserAccountDataCall { user }.abi_encode();
        let raw = self.reader.read_contract_state(pool, calldata.into()).await?;
        let account = ILendingPool::getUserAccountDataCall::abi_decode_returns(&raw).map_err(|e| {
            SimulationError::Failed {
                reason: Some(format!("undecodable getUserAccountData: {}", e)),
            }
        })?;
        debug!(pool = %pool, user = %user, debt = %account.totalDebtETH, "account data read");
        Ok(account.totalDebtETH)
    }
}
