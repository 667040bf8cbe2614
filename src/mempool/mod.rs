//! Mempool Detection Pipeline
//!
//! Purpose:
//!     Watch pending transactions, classify them, replay the suspicious ones,
//!     and hand accepted candidates to the response dispatcher.
//!
//! Created: 2026-10-07
//!
//! Architecture:
//!     decoder.rs    — calldata → DecodedCall (lending pool liquidate)
//!     heuristics.rs — HeuristicEngine + ordered rules, pure
//!     simulator.rs  — eth_call replay at pending + account-data read
//!     monitor.rs    — WatchLoop: bounded worker pool, per-hash deadline, stats
//!     types.rs      — PipelineOutcome, SeenHashes, WatchStats

pub mod decoder;
pub mod heuristics;
pub mod monitor;
pub mod simulator;
pub mod types;

pub use heuristics::{HeuristicEngine, HeuristicRule, KnownTargetRule, LargeValueRule};
pub use monitor::WatchLoop;
pub use simulator::Simulator;
pub use types::{PipelineOutcome, WatchSummary};
