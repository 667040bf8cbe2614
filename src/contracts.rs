//! Centralized Contract Definitions
//!
//! Solidity interfaces the sentinel talks to, defined with alloy's `sol!`
//! macro. Call structs are used both for decoding pending calldata and for
//! encoding our own reads and responses.
//!
//! Created: 2026-10-02

use alloy::sol;

// ── Lending pool ─────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface ILendingPool {
        function liquidate(address collateral, address user, uint256 debtToCover) external;
        function getUserAccountData(address user) external view returns (uint256 totalCollateralETH, uint256 totalDebtETH, uint256 availableBorrowsETH, uint256 currentLiquidationThreshold, uint256 ltv, uint256 healthFactor);
    }
}

// ── Response contract (countermeasure entry point) ──────────────────

sol! {
    #[sol(rpc)]
    interface IResponseContract {
        function executeBytes(bytes calldata data) external;
    }
}
