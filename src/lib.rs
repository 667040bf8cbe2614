//! Liquidation Sentinel Library
//!
//! Watches the pending transaction pool for liquidation exploits and
//! large-value transfers against configured lending pools, replays suspicious
//! candidates off-chain, and submits one countermeasure per threat to a
//! response contract.
//!
//! Created: 2026-10-02

pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod mempool;
pub mod response;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{load_config, SentinelConfig};
pub use error::{ChainError, ConfigError, PayloadError, SimulationError, SubmissionError};
pub use mempool::{HeuristicEngine, Simulator, WatchLoop, WatchSummary};
pub use response::{DispatchOutcome, ResponseDispatcher};
pub use types::{DecodedCall, PendingTransaction, ResponseRecord, ResponseStatus, SimulationResult, Verdict};
