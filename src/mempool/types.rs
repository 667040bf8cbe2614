//! Watch Loop Types
//!
//! Purpose:
//!     Per-hash pipeline outcomes, the seen-hash dedup cache, and the
//!     counters behind the periodic WATCH STATS line.
//!
//! Created: 2026-10-08

use crate::error::{ChainError, PayloadError, SimulationError, SubmissionError};
use crate::response::Reservation;
use alloy::primitives::TxHash;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Terminal state of one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Node no longer knows the hash (mined or evicted before lookup)
    Dropped,
    AlreadyMined { block: u64 },
    FetchFailed(ChainError),
    Benign,
    /// Suspicious, but the replay did not support acting on it
    Rejected { reason: String, error: SimulationError },
    Dispatched { response_tx: TxHash },
    /// A response for this trigger already exists
    DispatchSkipped(Reservation),
    NotAccepted,
    Unactionable(PayloadError),
    DispatchFailed(SubmissionError),
    TimedOut(Duration),
}

impl PipelineOutcome {
    pub fn state(&self) -> &'static str {
        match self {
            Self::Dropped => "dropped",
            Self::AlreadyMined { .. } => "already-mined",
            Self::FetchFailed(_) => "fetch-failed",
            Self::Benign => "benign",
            Self::Rejected { .. } => "rejected",
            Self::Dispatched { .. } => "dispatched",
            Self::DispatchSkipped(_) => "duplicate",
            Self::NotAccepted => "not-accepted",
            Self::Unactionable(_) => "unactionable",
            Self::DispatchFailed(_) => "dispatch-failed",
            Self::TimedOut(_) => "timed-out",
        }
    }
}

/// Hashes already handed to a pipeline, with first-sighting time.
#[derive(Debug, Clone, Default)]
pub struct SeenHashes {
    inner: Arc<DashMap<TxHash, Instant>>,
}

impl SeenHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per hash (until forgotten or expired).
    pub fn first_sighting(&self, hash: TxHash) -> bool {
        let mut first = false;
        self.inner.entry(hash).or_insert_with(|| {
            first = true;
            Instant::now()
        });
        first
    }

    pub fn forget(&self, hash: &TxHash) {
        self.inner.remove(hash);
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, seen_at| seen_at.elapsed() < max_age);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Point-in-time copy of the watch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub observed: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub already_mined: u64,
    pub fetch_failed: u64,
    pub benign: u64,
    pub suspicious: u64,
    pub rejected: u64,
    pub dispatched: u64,
    pub skipped: u64,
    pub unactionable: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
pub struct WatchStats {
    pub observed: AtomicU64,
    pub duplicates: AtomicU64,
    pub suspicious: AtomicU64,
    dropped: AtomicU64,
    already_mined: AtomicU64,
    fetch_failed: AtomicU64,
    benign: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    unactionable: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl WatchStats {
    pub fn record(&self, outcome: &PipelineOutcome) {
        let counter = match outcome {
            PipelineOutcome::Dropped => &self.dropped,
            PipelineOutcome::AlreadyMined { .. } => &self.already_mined,
            PipelineOutcome::FetchFailed(_) => &self.fetch_failed,
            PipelineOutcome::Benign => &self.benign,
            PipelineOutcome::Rejected { .. } => &self.rejected,
            PipelineOutcome::Dispatched { .. } => &self.dispatched,
            PipelineOutcome::DispatchSkipped(_) => &self.skipped,
            PipelineOutcome::NotAccepted | PipelineOutcome::DispatchFailed(_) => &self.failed,
            PipelineOutcome::Unactionable(_) => &self.unactionable,
            PipelineOutcome::TimedOut(_) => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WatchSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        WatchSummary {
            observed: load(&self.observed),
            duplicates: load(&self.duplicates),
            dropped: load(&self.dropped),
            already_mined: load(&self.already_mined),
            fetch_failed: load(&self.fetch_failed),
            benign: load(&self.benign),
            suspicious: load(&self.suspicious),
            rejected: load(&self.rejected),
            dispatched: load(&self.dispatched),
            skipped: load(&self.skipped),
            unactionable: load(&self.unactionable),
            failed: load(&self.failed),
            timed_out: load(&self.timed_out),
        }
    }
}
