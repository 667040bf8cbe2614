//! Calldata Decoder
//!
//! Purpose:
//!     Recognize lending-pool liquidation calls in pending transaction input.
//!
//! Created: 2026-10-07
//!
//! Supported Function Selectors:
//!     ILendingPool:
//!       liquidate(address collateral, address user, uint256 debtToCover)

use crate::contracts::ILendingPool;
use crate::types::DecodedCall;
use alloy::sol_types::SolCall;
use tracing::trace;

const LIQUIDATE: [u8; 4] = ILendingPool::liquidateCall::SELECTOR;

/// Decode a `liquidate` call. None for any other selector or a malformed body.
pub fn decode_liquidate(input: &[u8]) -> Option<DecodedCall> {
    if input.len() < 4 || input[..4] != LIQUIDATE {
        return None;
    }

    match ILendingPool::liquidateCall::abi_decode(input) {
        Ok(call) => Some(DecodedCall::Liquidate {
            collateral: call.collateral,
            user: call.user,
            debt_to_cover: call.debtToCover,
        }),
        Err(e) => {
            trace!("liquidate selector with undecodable body ({} bytes): {}", input.len(), e);
            None
        }
    }
}

/// Return the 4-byte selector as a hex string for logging
pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x????".to_string();
    }
    format!("0x{:02x}{:02x}{:02x}{:02x}", input[0], input[1], input[2], input[3])
}
