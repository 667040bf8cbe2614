//! Response Registry
//!
//! Thread-safe ResponseRecord storage keyed by triggering tx hash, using DashMap.
//!
//! Created: 2026-10-03
//!
//! Invariant: at most one unresolved (pending) record per triggering hash.
//! `try_reserve` is the only way to create or re-open a record, and it runs
//! the check-then-insert under the shard lock of the DashMap entry, so two
//! concurrent pipelines for the same hash can never both acquire it.

use crate::types::{ResponseRecord, ResponseStatus};
use alloy::primitives::TxHash;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Original dispatch plus one re-attempt after an explicit failure.
pub const MAX_ATTEMPTS: u32 = 2;

/// Result of the serialized dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Caller owns the pending record and may submit
    Acquired { attempt: u32 },
    /// A response for this trigger is still unresolved
    InFlight,
    /// A response for this trigger was confirmed
    AlreadyResponded,
    /// Failed on every permitted attempt
    RetriesExhausted,
}

/// Shared, lock-guarded map of response records.
#[derive(Debug, Clone, Default)]
pub struct ResponseRegistry {
    records: Arc<DashMap<TxHash, ResponseRecord>>,
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-then-insert for a triggering hash.
    pub fn try_reserve(&self, trigger: TxHash) -> Reservation {
        match self.records.entry(trigger) {
            Entry::Vacant(vacant) => {
                vacant.insert(ResponseRecord::new_pending(trigger));
                Reservation::Acquired { attempt: 1 }
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                match record.status {
                    ResponseStatus::Pending => Reservation::InFlight,
                    ResponseStatus::Confirmed => Reservation::AlreadyResponded,
                    ResponseStatus::Failed if record.attempts >= MAX_ATTEMPTS => {
                        Reservation::RetriesExhausted
                    }
                    ResponseStatus::Failed => {
                        record.attempts += 1;
                        record.status = ResponseStatus::Pending;
                        record.submitted_at = Utc::now();
                        record.response_tx_hash = None;
                        debug!(trigger = %trigger, attempt = record.attempts, "response re-attempt reserved");
                        Reservation::Acquired {
                            attempt: record.attempts,
                        }
                    }
                }
            }
        }
    }

    /// Drop a reservation that never reached submission.
    ///
    /// A first attempt is removed entirely; a re-attempt falls back to failed
    /// so the attempt budget is still honored.
    pub fn release(&self, trigger: TxHash, reason: &str) {
        if let Entry::Occupied(mut occupied) = self.records.entry(trigger) {
            if occupied.get().attempts <= 1 {
                occupied.remove();
            } else {
                let record = occupied.get_mut();
                record.status = ResponseStatus::Failed;
                record.last_error = Some(reason.to_string());
            }
        }
    }

    pub fn mark_submitted(&self, trigger: TxHash, response_tx: TxHash) -> Option<ResponseRecord> {
        self.records.get_mut(&trigger).map(|mut record| {
            record.response_tx_hash = Some(response_tx);
            record.submitted_at = Utc::now();
            record.clone()
        })
    }

    pub fn mark_confirmed(&self, trigger: TxHash) -> Option<ResponseRecord> {
        self.transition(trigger, ResponseStatus::Confirmed, None)
    }

    pub fn mark_failed(&self, trigger: TxHash, error: &str) -> Option<ResponseRecord> {
        self.transition(trigger, ResponseStatus::Failed, Some(error.to_string()))
    }

    /// Failed with the attempt budget spent. For sends whose fate is unknown:
    /// the response may already be on the wire, so no re-attempt is allowed.
    pub fn mark_abandoned(&self, trigger: TxHash, error: &str) -> Option<ResponseRecord> {
        self.records.get_mut(&trigger).map(|mut record| {
            record.status = ResponseStatus::Failed;
            record.attempts = MAX_ATTEMPTS;
            record.last_error = Some(error.to_string());
            record.clone()
        })
    }

    /// True when a failed record still has its re-attempt available.
    pub fn can_reattempt(&self, trigger: &TxHash) -> bool {
        self.records
            .get(trigger)
            .is_some_and(|r| r.status == ResponseStatus::Failed && r.attempts < MAX_ATTEMPTS)
    }

    fn transition(
        &self,
        trigger: TxHash,
        status: ResponseStatus,
        error: Option<String>,
    ) -> Option<ResponseRecord> {
        self.records.get_mut(&trigger).map(|mut record| {
            record.status = status;
            if error.is_some() {
                record.last_error = error;
            }
            record.clone()
        })
    }

    pub fn get(&self, trigger: &TxHash) -> Option<ResponseRecord> {
        self.records.get(trigger).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// (pending, confirmed, failed)
    pub fn counts(&self) -> (usize, usize, usize) {
        self.records
            .iter()
            .fold((0, 0, 0), |(p, c, f), entry| match entry.value().status {
                ResponseStatus::Pending => (p + 1, c, f),
                ResponseStatus::Confirmed => (p, c + 1, f),
                ResponseStatus::Failed => (p, c, f + 1),
            })
    }
}
