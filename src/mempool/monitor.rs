//! Watch Loop
//!
//! Purpose:
//!     Consume the pending-hash feed and drive each new hash through
//!     fetch → evaluate → simulate → dispatch as an independent task, bounded
//!     by a semaphore. Emits one structured log entry per terminal state and a
//!     periodic WATCH STATS line.
//!
//! Created: 2026-10-08
//! Modified: 2026-10-09 — shutdown drains in-flight pipelines within a grace period
//!
//! Notes:
//!     - A full worker pool stalls intake; the bounded feed queue behind it
//!       then sheds hashes (see chain::feed).
//!     - Each pipeline carries its own deadline; timing out cancels that hash only.
//!     - NotFound on fetch is expected (mined or evicted) and logged at trace.

use super::heuristics::HeuristicEngine;
use super::simulator::Simulator;
use super::types::{PipelineOutcome, SeenHashes, WatchStats, WatchSummary};
use crate::chain::{ChainReader, FeedStats, ResponseSubmitter};
use crate::config::PipelineSettings;
use crate::error::{ChainError, SimulationError};
use crate::response::{DispatchOutcome, ResponseDispatcher};
use crate::types::{PendingTransaction, Verdict};
use alloy::primitives::TxHash;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, trace, warn};

/// One hash's worth of work. Shared by every spawned pipeline task.
struct Pipeline<R, S> {
    reader: Arc<R>,
    engine: HeuristicEngine,
    simulator: Simulator<R>,
    dispatcher: ResponseDispatcher<S>,
    settings: PipelineSettings,
    seen: SeenHashes,
    stats: WatchStats,
}

impl<R, S> Pipeline<R, S>
where
    R: ChainReader + 'static,
    S: ResponseSubmitter + 'static,
{
    async fn run(&self, hash: TxHash) {
        let outcome = match timeout(self.settings.pipeline_timeout, self.process(hash)).await {
            Ok(outcome) => outcome,
            Err(_) => PipelineOutcome::TimedOut(self.settings.pipeline_timeout),
        };

        log_outcome(hash, &outcome);
        self.stats.record(&outcome);
    }

    async fn process(&self, hash: TxHash) -> PipelineOutcome {
        let tx = match self.fetch(hash).await {
            Ok(tx) => tx,
            Err(ChainError::NotFound) => return PipelineOutcome::Dropped,
            Err(e) => return PipelineOutcome::FetchFailed(e),
        };

        if let Some(block) = tx.block_number {
            return PipelineOutcome::AlreadyMined { block };
        }

        let verdict = self.engine.evaluate(&tx);
        let reason = match &verdict {
            Verdict::Benign => return PipelineOutcome::Benign,
            Verdict::Suspicious { reason, extracted } => {
                self.stats.suspicious.fetch_add(1, Ordering::Relaxed);
                info!(
                    tx = %hash,
                    rules = %reason,
                    call = extracted.kind(),
                    to = ?tx.to,
                    value = %tx.value,
                    "SUSPICIOUS"
                );
                reason.clone()
            }
        };

        let result = match self.simulator.simulate(&tx, &verdict).await {
            Ok(result) => result,
            Err(error) => return PipelineOutcome::Rejected { reason, error },
        };

        match self.dispatcher.dispatch(&tx, &result).await {
            DispatchOutcome::Submitted { response_tx, .. } => PipelineOutcome::Dispatched { response_tx },
            DispatchOutcome::Duplicate(reservation) => PipelineOutcome::DispatchSkipped(reservation),
            DispatchOutcome::NotAccepted => PipelineOutcome::NotAccepted,
            DispatchOutcome::Unencodable(e) => PipelineOutcome::Unactionable(e),
            DispatchOutcome::Failed(e) => PipelineOutcome::DispatchFailed(e),
        }
    }

    /// Fetch with a bounded retry on transient failures only.
    async fn fetch(&self, hash: TxHash) -> Result<PendingTransaction, ChainError> {
        let mut retries = 0;
        loop {
            let result = match timeout(self.settings.fetch_timeout, self.reader.fetch_transaction(hash)).await {
                Ok(result) => result,
                Err(_) => Err(ChainError::Unavailable(format!(
                    "lookup timed out after {}ms",
                    self.settings.fetch_timeout.as_millis()
                ))),
            };
            match result {
                Err(e) if e.is_transient() && retries < self.settings.fetch_retries => {
                    retries += 1;
                    debug!(tx = %hash, retry = retries, error = %e, "retrying transaction lookup");
                }
                other => return other,
            }
        }
    }
}

fn log_outcome(hash: TxHash, outcome: &PipelineOutcome) {
    let state = outcome.state();
    match outcome {
        PipelineOutcome::Dropped => trace!(tx = %hash, state, "not found, mined or evicted before lookup"),
        PipelineOutcome::AlreadyMined { block } => debug!(tx = %hash, state, block, "no longer pending"),
        PipelineOutcome::FetchFailed(e) => warn!(tx = %hash, state, error = %e, "transaction lookup failed"),
        PipelineOutcome::Benign => debug!(tx = %hash, state, "benign"),
        PipelineOutcome::Rejected { reason, error } => match error {
            SimulationError::Failed { .. } => {
                info!(tx = %hash, state, rules = %reason, error = %error, "REJECTED")
            }
            SimulationError::Timeout(_) | SimulationError::Unavailable(_) => {
                warn!(tx = %hash, state, rules = %reason, error = %error, "REJECTED")
            }
        },
        PipelineOutcome::Dispatched { response_tx } => {
            info!(tx = %hash, state, response_tx = %response_tx, "DISPATCHED")
        }
        PipelineOutcome::DispatchSkipped(reservation) => {
            debug!(tx = %hash, state, reservation = ?reservation, "response already handled")
        }
        PipelineOutcome::NotAccepted => warn!(tx = %hash, state, "dispatcher refused unaccepted result"),
        PipelineOutcome::Unactionable(e) => warn!(tx = %hash, state, error = %e, "no response payload for this verdict"),
        PipelineOutcome::DispatchFailed(e) => error!(tx = %hash, state, error = %e, "RESPONSE FAILED"),
        PipelineOutcome::TimedOut(limit) => {
            warn!(tx = %hash, state, timeout_ms = limit.as_millis() as u64, "pipeline deadline exceeded")
        }
    }
}

pub struct WatchLoop<R, S> {
    pipeline: Arc<Pipeline<R, S>>,
    feed_stats: Option<Arc<FeedStats>>,
}

impl<R, S> WatchLoop<R, S>
where
    R: ChainReader + 'static,
    S: ResponseSubmitter + 'static,
{
    pub fn new(
        reader: Arc<R>,
        engine: HeuristicEngine,
        dispatcher: ResponseDispatcher<S>,
        settings: PipelineSettings,
    ) -> Self {
        let simulator = Simulator::new(Arc::clone(&reader), settings.simulation_timeout);
        let seen = SeenHashes::new();
        // A failed response with its re-attempt still open: let a re-delivery through.
        let forget = seen.clone();
        let dispatcher = dispatcher.on_failure(move |trigger| forget.forget(&trigger));
        Self {
            pipeline: Arc::new(Pipeline {
                reader,
                engine,
                simulator,
                dispatcher,
                settings,
                seen,
                stats: WatchStats::default(),
            }),
            feed_stats: None,
        }
    }

    pub fn with_feed_stats(mut self, feed_stats: Arc<FeedStats>) -> Self {
        self.feed_stats = Some(feed_stats);
        self
    }

    pub fn dispatcher(&self) -> &ResponseDispatcher<S> {
        &self.pipeline.dispatcher
    }

    pub fn seen(&self) -> &SeenHashes {
        &self.pipeline.seen
    }

    pub fn summary(&self) -> WatchSummary {
        self.pipeline.stats.snapshot()
    }

    /// Run until `shutdown` resolves or the feed ends, then drain.
    pub async fn run<F, Sd>(&self, feed: F, shutdown: Sd) -> WatchSummary
    where
        F: Stream<Item = TxHash>,
        Sd: Future<Output = ()>,
    {
        let settings = &self.pipeline.settings;
        let mut feed = std::pin::pin!(feed);
        let mut shutdown = std::pin::pin!(shutdown);

        let semaphore = Arc::new(Semaphore::new(settings.max_concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();

        let mut stats_tick = interval(settings.stats_interval);
        // Skip the first immediate tick
        stats_tick.tick().await;

        info!(
            "Watch loop started | rules={} | max_concurrency={} | pipeline_timeout={}ms",
            self.pipeline.engine.rule_names().join(","),
            settings.max_concurrency,
            settings.pipeline_timeout.as_millis()
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping intake");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Pipeline task panicked: {}", e);
                        }
                    }
                }

                _ = stats_tick.tick() => {
                    let expired = self.pipeline.seen.cleanup(settings.seen_ttl);
                    if expired > 0 {
                        debug!(expired, "seen-hash cache pruned");
                    }
                    self.report_stats(tasks.len());
                }

                next = feed.next() => {
                    let Some(hash) = next else {
                        info!("Pending feed ended");
                        break;
                    };
                    self.pipeline.stats.observed.fetch_add(1, Ordering::Relaxed);

                    if !self.pipeline.seen.first_sighting(hash) {
                        self.pipeline.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                        trace!(tx = %hash, "duplicate delivery ignored");
                        continue;
                    }

                    // Backpressure: wait for a worker slot before taking more input.
                    let permit = tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            self.pipeline.seen.forget(&hash);
                            info!("Shutdown requested, stopping intake");
                            break;
                        }
                        permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let pipeline = Arc::clone(&self.pipeline);
                    tasks.spawn(async move {
                        let _permit = permit;
                        pipeline.run(hash).await;
                    });
                }
            }
        }

        self.drain(tasks).await;
        self.pipeline.dispatcher.shutdown(settings.shutdown_grace).await;

        let summary = self.summary();
        self.report_stats(0);
        info!("Watch loop stopped");
        summary
    }

    /// Give in-flight pipelines the grace period, then abort at their next await point.
    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        let grace = self.pipeline.settings.shutdown_grace;
        info!("Draining {} in-flight pipelines (grace {}ms)", tasks.len(), grace.as_millis());

        let drained = timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("Pipeline task panicked: {}", e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Abandoning {} pipelines after grace period", tasks.len());
            tasks.shutdown().await;
        }
    }

    fn report_stats(&self, in_flight: usize) {
        let s = self.summary();
        let (pending, confirmed, failed) = self.pipeline.dispatcher.registry().counts();
        let feed = self
            .feed_stats
            .as_ref()
            .map(|f| {
                let (received, dropped, reconnects) = f.snapshot();
                format!(" | feed received={} queue_full={} reconnects={}", received, dropped, reconnects)
            })
            .unwrap_or_default();

        info!(
            "WATCH STATS | observed={} duplicates={} | benign={} suspicious={} rejected={} | \
             dispatched={} skipped={} unactionable={} failed={} | dropped={} mined={} \
             fetch_failed={} timed_out={} | in_flight={} seen={} | responses pending={} \
             confirmed={} failed={}{}",
            s.observed,
            s.duplicates,
            s.benign,
            s.suspicious,
            s.rejected,
            s.dispatched,
            s.skipped,
            s.unactionable,
            s.failed,
            s.dropped,
            s.already_mined,
            s.fetch_failed,
            s.timed_out,
            in_flight,
            self.pipeline.seen.len(),
            pending,
            confirmed,
            failed,
            feed,
        );
    }
}
