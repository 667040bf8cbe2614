//! Response Dispatcher
//!
//! Purpose:
//!     Turn an accepted SimulationResult into exactly one countermeasure
//!     submission per triggering transaction, and track it to a terminal state.
//!
//! Created: 2026-10-06
//!
//! Flow:
//!     1. accepted?                        — otherwise NotAccepted, no side effects
//!     2. registry.try_reserve(trigger)    — serialized dedup, before any submission
//!     3. schema.encode(derived params)    — failure releases the reservation
//!     4. submit (per-attempt timeout)     — one retry on Transient only
//!     5. spawn confirmation watcher       — pending → confirmed | failed
//!
//! Notes:
//!     - A dispatch future dropped before sending marks the record failed, so a
//!       stale pending record never blocks the re-attempt. Dropped mid-send, or
//!       a TimedOut send, may already be broadcast: the record is abandoned
//!       with no re-attempt left.
//!     - Failures that still leave the re-attempt open are reported to the
//!       failure hook (the watch loop uses it to forget the seen hash).
//!     - Dry-run submitters broadcast nothing; their records stay pending.

use crate::chain::ResponseSubmitter;
use crate::config::SentinelConfig;
use crate::error::{PayloadError, SubmissionError};
use crate::response::audit::AuditLog;
use crate::response::payload::PayloadSchema;
use crate::response::registry::{Reservation, ResponseRegistry};
use crate::types::{PendingTransaction, ResponseRecord, SimulationResult};
use alloy::primitives::{Bytes, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// How a dispatch call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Submitted { response_tx: TxHash, attempt: u32 },
    /// Dedup check refused the reservation
    Duplicate(Reservation),
    NotAccepted,
    Unencodable(PayloadError),
    Failed(SubmissionError),
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub gas_limit: u64,
    pub submission_timeout: Duration,
    pub confirmation_timeout: Duration,
}

impl DispatcherSettings {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            gas_limit: config.response_gas_limit,
            submission_timeout: config.pipeline.submission_timeout,
            confirmation_timeout: config.pipeline.confirmation_timeout,
        }
    }
}

type FailureHook = Arc<dyn Fn(TxHash) + Send + Sync>;

/// Marks the reservation failed if dropped before an outcome was recorded.
struct ReservationGuard {
    registry: ResponseRegistry,
    trigger: TxHash,
    armed: bool,
    sending: bool,
}

impl ReservationGuard {
    fn new(registry: &ResponseRegistry, trigger: TxHash) -> Self {
        Self {
            registry: registry.clone(),
            trigger,
            armed: true,
            sending: false,
        }
    }

    fn sending(&mut self) {
        self.sending = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.sending {
            warn!(trigger = %self.trigger, "dispatch cancelled mid-send, response abandoned");
            self.registry
                .mark_abandoned(self.trigger, "dispatch cancelled during submission");
        } else {
            warn!(trigger = %self.trigger, "dispatch cancelled before outcome, marking response failed");
            self.registry.mark_failed(self.trigger, "dispatch cancelled");
        }
    }
}

pub struct ResponseDispatcher<S> {
    submitter: Arc<S>,
    schema: PayloadSchema,
    registry: ResponseRegistry,
    settings: DispatcherSettings,
    audit: Option<Arc<AuditLog>>,
    on_failure: Option<FailureHook>,
    watchers: Mutex<JoinSet<()>>,
}

impl<S: ResponseSubmitter + 'static> ResponseDispatcher<S> {
    pub fn new(submitter: Arc<S>, schema: PayloadSchema, settings: DispatcherSettings) -> Self {
        Self {
            submitter,
            schema,
            registry: ResponseRegistry::new(),
            settings,
            audit: None,
            on_failure: None,
            watchers: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        let audit = audit.dry_run(!self.submitter.broadcasts());
        self.audit = Some(Arc::new(audit));
        self
    }

    /// Called with the trigger whenever a response fails and a re-attempt is still allowed.
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(TxHash) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &ResponseRegistry {
        &self.registry
    }

    /// Submit one countermeasure for `tx`, unless a response is already in flight or done.
    pub async fn dispatch(&self, tx: &PendingTransaction, result: &SimulationResult) -> DispatchOutcome {
        if !result.accepted {
            warn!(tx = %tx.hash, "refusing to dispatch for a rejected simulation");
            return DispatchOutcome::NotAccepted;
        }

        let attempt = match self.registry.try_reserve(tx.hash) {
            Reservation::Acquired { attempt } => attempt,
            refused => {
                debug!(tx = %tx.hash, reservation = ?refused, "response already handled");
                return DispatchOutcome::Duplicate(refused);
            }
        };
        let mut guard = ReservationGuard::new(&self.registry, tx.hash);

        let payload = match self.schema.encode(result) {
            Ok(payload) => payload,
            Err(e) => {
                guard.disarm();
                self.registry.release(tx.hash, &e.to_string());
                warn!(tx = %tx.hash, error = %e, "derived parameters do not fit the response payload");
                return DispatchOutcome::Unencodable(e);
            }
        };

        guard.sending();
        let submitted = self.submit_with_retry(tx.hash, payload).await;
        guard.disarm();

        match submitted {
            Ok(response_tx) => {
                if let Some(record) = self.registry.mark_submitted(tx.hash, response_tx) {
                    self.audit_record(&record);
                }
                info!(trigger = %tx.hash, response_tx = %response_tx, attempt, "RESPONSE SUBMITTED");
                if self.submitter.broadcasts() {
                    self.watch_confirmation(tx.hash, response_tx).await;
                } else {
                    debug!(trigger = %tx.hash, "dry run, response left pending");
                }
                DispatchOutcome::Submitted { response_tx, attempt }
            }
            Err(e) => {
                let record = match &e {
                    // May have reached the node; a second send could double the response.
                    SubmissionError::TimedOut(_) => self.registry.mark_abandoned(tx.hash, &e.to_string()),
                    _ => self.registry.mark_failed(tx.hash, &e.to_string()),
                };
                if let Some(record) = record {
                    self.audit_record(&record);
                }
                error!(trigger = %tx.hash, attempt, error = %e, "response submission failed");
                notify_failure(&self.on_failure, &self.registry, tx.hash);
                DispatchOutcome::Failed(e)
            }
        }
    }

    async fn submit_with_retry(&self, trigger: TxHash, payload: Bytes) -> Result<TxHash, SubmissionError> {
        match self.submit_once(payload.clone()).await {
            Err(e) if e.is_retryable() => {
                warn!(trigger = %trigger, error = %e, "transient submission failure, retrying once");
                self.submit_once(payload).await
            }
            other => other,
        }
    }

    async fn submit_once(&self, payload: Bytes) -> Result<TxHash, SubmissionError> {
        let limit = self.settings.submission_timeout;
        match timeout(limit, self.submitter.submit(payload, self.settings.gas_limit)).await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::TimedOut(limit)),
        }
    }

    async fn watch_confirmation(&self, trigger: TxHash, response_tx: TxHash) {
        let submitter = Arc::clone(&self.submitter);
        let registry = self.registry.clone();
        let audit = self.audit.clone();
        let on_failure = self.on_failure.clone();
        let limit = self.settings.confirmation_timeout;

        let mut watchers = self.watchers.lock().await;
        // Reap finished watchers so the set stays bounded.
        while watchers.try_join_next().is_some() {}

        watchers.spawn(async move {
            let record = match submitter.await_confirmation(response_tx, limit).await {
                Ok(true) => {
                    info!(trigger = %trigger, response_tx = %response_tx, "RESPONSE CONFIRMED");
                    registry.mark_confirmed(trigger)
                }
                Ok(false) => {
                    warn!(trigger = %trigger, response_tx = %response_tx, "response reverted on-chain");
                    registry.mark_failed(trigger, "response reverted on-chain")
                }
                Err(e) => {
                    warn!(trigger = %trigger, response_tx = %response_tx, error = %e, "response unconfirmed");
                    registry.mark_failed(trigger, &e.to_string())
                }
            };
            if let (Some(audit), Some(record)) = (audit, record) {
                audit.record(&record);
            }
            notify_failure(&on_failure, &registry, trigger);
        });
    }

    fn audit_record(&self, record: &ResponseRecord) {
        if let Some(audit) = &self.audit {
            audit.record(record);
        }
    }

    /// Wait up to `grace` for outstanding confirmation watchers, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let mut watchers = self.watchers.lock().await;
        if watchers.is_empty() {
            return;
        }
        info!("Waiting on {} confirmation watchers (grace {}ms)", watchers.len(), grace.as_millis());
        let drained = timeout(grace, async {
            while watchers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Abandoning {} unconfirmed responses at shutdown", watchers.len());
            watchers.shutdown().await;
        }
    }
}

fn notify_failure(hook: &Option<FailureHook>, registry: &ResponseRegistry, trigger: TxHash) {
    if let Some(hook) = hook {
        if registry.can_reattempt(&trigger) {
            hook(trigger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, hash, pending_tx, MockSubmitter};
    use crate::types::{params, ResponseStatus};
    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::U256;
    use std::collections::BTreeMap;

    fn settings() -> DispatcherSettings {
        DispatcherSettings {
            gas_limit: 300_000,
            submission_timeout: Duration::from_millis(500),
            confirmation_timeout: Duration::from_millis(500),
        }
    }

    fn liquidation_result() -> SimulationResult {
        let mut derived = BTreeMap::new();
        derived.insert(params::COLLATERAL.to_string(), DynSolValue::Address(addr(0x0a)));
        derived.insert(params::USER.to_string(), DynSolValue::Address(addr(0x0b)));
        derived.insert(params::DEBT_TO_COVER.to_string(), DynSolValue::Uint(U256::from(100u64), 256));
        SimulationResult::accepted(derived)
    }

    fn dispatcher(submitter: MockSubmitter) -> (Arc<MockSubmitter>, ResponseDispatcher<MockSubmitter>) {
        let submitter = Arc::new(submitter);
        let dispatcher = ResponseDispatcher::new(
            Arc::clone(&submitter),
            PayloadSchema::liquidation_default(),
            settings(),
        );
        (submitter, dispatcher)
    }

    fn trigger(n: u8) -> PendingTransaction {
        pending_tx(hash(n), Some(addr(0xaa)), Bytes::new(), U256::ZERO)
    }

    #[tokio::test]
    async fn test_submits_and_confirms() {
        let (submitter, dispatcher) = dispatcher(MockSubmitter::new());
        let tx = trigger(1);

        let outcome = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert!(matches!(outcome, DispatchOutcome::Submitted { attempt: 1, .. }));
        assert_eq!(submitter.submission_count(), 1);
        assert_eq!(submitter.payloads.lock().unwrap()[0].len(), 96);

        dispatcher.shutdown(Duration::from_secs(1)).await;
        assert_eq!(dispatcher.registry().get(&tx.hash).unwrap().status, ResponseStatus::Confirmed);

        let again = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert_eq!(again, DispatchOutcome::Duplicate(Reservation::AlreadyResponded));
        assert_eq!(submitter.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_submits_once() {
        let (submitter, dispatcher) = dispatcher(MockSubmitter::new().with_delay(Duration::from_millis(50)));
        let tx = trigger(2);
        let result = liquidation_result();

        let (a, b) = tokio::join!(dispatcher.dispatch(&tx, &result), dispatcher.dispatch(&tx, &result));

        let submitted = [&a, &b]
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Submitted { .. }))
            .count();
        assert_eq!(submitted, 1);
        assert!([&a, &b].contains(&&DispatchOutcome::Duplicate(Reservation::InFlight)));
        assert_eq!(submitter.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let (submitter, dispatcher) = dispatcher(
            MockSubmitter::new().then(Err(SubmissionError::Transient("nonce too low".into()))),
        );
        let outcome = dispatcher.dispatch(&trigger(3), &liquidation_result()).await;
        assert!(matches!(outcome, DispatchOutcome::Submitted { .. }));
        assert_eq!(submitter.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_revert_not_retried_and_recorded_failed() {
        let (submitter, dispatcher) = dispatcher(
            MockSubmitter::new().then(Err(SubmissionError::Reverted("bad payload".into()))),
        );
        let tx = trigger(4);
        let outcome = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert_eq!(outcome, DispatchOutcome::Failed(SubmissionError::Reverted("bad payload".into())));
        assert_eq!(submitter.submission_count(), 1);

        let record = dispatcher.registry().get(&tx.hash).unwrap();
        assert_eq!(record.status, ResponseStatus::Failed);
        assert!(record.last_error.unwrap().contains("bad payload"));

        // One re-attempt is permitted after an explicit failure.
        let retry = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert!(matches!(retry, DispatchOutcome::Submitted { attempt: 2, .. }));
    }

    #[tokio::test]
    async fn test_submission_timeout_not_retried() {
        let (submitter, dispatcher) = dispatcher(MockSubmitter::new().with_delay(Duration::from_secs(2)));
        let tx = trigger(5);
        let outcome = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(SubmissionError::TimedOut(_))));
        assert_eq!(submitter.submission_count(), 1);

        // The timed-out send may have landed: no re-attempt either.
        let again = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert_eq!(again, DispatchOutcome::Duplicate(Reservation::RetriesExhausted));
        assert_eq!(submitter.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_mid_send_is_never_resent() {
        let (submitter, dispatcher) = dispatcher(MockSubmitter::new().with_delay(Duration::from_millis(300)));
        let tx = trigger(9);
        let result = liquidation_result();

        let cancelled = timeout(Duration::from_millis(50), dispatcher.dispatch(&tx, &result)).await;
        assert!(cancelled.is_err());
        assert_eq!(submitter.submission_count(), 1);

        let record = dispatcher.registry().get(&tx.hash).unwrap();
        assert_eq!(record.status, ResponseStatus::Failed);
        assert_eq!(record.attempts, crate::response::MAX_ATTEMPTS);

        let again = dispatcher.dispatch(&tx, &result).await;
        assert_eq!(again, DispatchOutcome::Duplicate(Reservation::RetriesExhausted));
        assert_eq!(submitter.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_hook_reports_reattemptable_failures() {
        let reported = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let submitter = Arc::new(
            MockSubmitter::new()
                .then(Err(SubmissionError::Reverted("paused".into())))
                .with_confirmation(Ok(false)),
        );
        let dispatcher = ResponseDispatcher::new(
            Arc::clone(&submitter),
            PayloadSchema::liquidation_default(),
            settings(),
        )
        .on_failure(move |trigger| sink.lock().unwrap().push(trigger));

        // Rejected send: re-attempt open, reported.
        dispatcher.dispatch(&trigger(10), &liquidation_result()).await;
        // Reverted on-chain: reported once the watcher resolves.
        dispatcher.dispatch(&trigger(11), &liquidation_result()).await;
        dispatcher.shutdown(Duration::from_secs(1)).await;
        assert_eq!(*reported.lock().unwrap(), vec![hash(10), hash(11)]);

        // Second failure exhausts the budget: nothing more to report.
        dispatcher.dispatch(&trigger(11), &liquidation_result()).await;
        dispatcher.shutdown(Duration::from_secs(1)).await;
        assert_eq!(reported.lock().unwrap().len(), 2);
        assert_eq!(
            dispatcher.registry().get(&hash(11)).unwrap().attempts,
            crate::response::MAX_ATTEMPTS
        );
    }

    #[tokio::test]
    async fn test_dry_run_response_stays_pending() {
        let submitter = Arc::new(crate::chain::DryRunSubmitter::new(addr(0xfe)));
        let dispatcher = ResponseDispatcher::new(
            Arc::clone(&submitter),
            PayloadSchema::liquidation_default(),
            settings(),
        );
        let tx = trigger(12);

        let outcome = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert!(matches!(outcome, DispatchOutcome::Submitted { attempt: 1, .. }));
        dispatcher.shutdown(Duration::from_secs(1)).await;

        let record = dispatcher.registry().get(&tx.hash).unwrap();
        assert_eq!(record.status, ResponseStatus::Pending);
        assert!(record.response_tx_hash.is_some());
        assert_eq!(submitter.sent(), 1);

        let again = dispatcher.dispatch(&tx, &liquidation_result()).await;
        assert_eq!(again, DispatchOutcome::Duplicate(Reservation::InFlight));
    }

    #[tokio::test]
    async fn test_rejected_result_has_no_side_effects() {
        let (submitter, dispatcher) = dispatcher(MockSubmitter::new());
        let outcome = dispatcher
            .dispatch(&trigger(6), &SimulationResult::rejected("reverted"))
            .await;
        assert_eq!(outcome, DispatchOutcome::NotAccepted);
        assert!(dispatcher.registry().is_empty());
        assert_eq!(submitter.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_unencodable_releases_reservation() {
        let (submitter, dispatcher) = dispatcher(MockSubmitter::new());
        let mut derived = BTreeMap::new();
        derived.insert(params::VALUE.to_string(), DynSolValue::Uint(U256::from(1u64), 256));

        let outcome = dispatcher
            .dispatch(&trigger(7), &SimulationResult::accepted(derived))
            .await;
        assert_eq!(
            outcome,
            DispatchOutcome::Unencodable(PayloadError::MissingParameter("collateral".into()))
        );
        assert!(dispatcher.registry().is_empty());
        assert_eq!(submitter.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_reverted_confirmation_marks_failed() {
        let (_, dispatcher) = dispatcher(MockSubmitter::new().with_confirmation(Ok(false)));
        let tx = trigger(8);
        dispatcher.dispatch(&tx, &liquidation_result()).await;
        dispatcher.shutdown(Duration::from_secs(1)).await;

        let record = dispatcher.registry().get(&tx.hash).unwrap();
        assert_eq!(record.status, ResponseStatus::Failed);
        assert!(record.response_tx_hash.is_some());
    }
}
