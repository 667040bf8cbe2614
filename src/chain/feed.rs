//! Pending Hash Feed
//!
//! Purpose:
//!     Subscribe to pending transaction hashes over WebSocket and forward them
//!     into a bounded channel. Reconnects with exponential backoff when the
//!     subscription drops, and never blocks the subscription on a slow consumer.
//!
//! Created: 2026-10-05
//!
//! Notes:
//!     - Full queue ⇒ the hash is dropped and counted (backpressure by shedding)
//!     - Receiver dropped ⇒ the feed task exits

use alloy::primitives::TxHash;
use alloy::providers::{DynProvider, Provider};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectConfig {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(500, 30_000)
    }
}

pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next_ms = current.as_millis().saturating_mul(2) as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(next_ms.min(max_ms))
}

/// Counters shared with the watch loop's stats line.
#[derive(Debug, Default)]
pub struct FeedStats {
    pub received: AtomicU64,
    pub dropped_full: AtomicU64,
    pub reconnects: AtomicU64,
}

impl FeedStats {
    /// (received, dropped on full queue, reconnects)
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.dropped_full.load(Ordering::Relaxed),
            self.reconnects.load(Ordering::Relaxed),
        )
    }
}

/// Forward a hash without waiting. Returns false once the receiver is gone.
pub fn forward(tx: &mpsc::Sender<TxHash>, hash: TxHash, stats: &FeedStats) -> bool {
    stats.received.fetch_add(1, Ordering::Relaxed);
    match tx.try_send(hash) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            stats.dropped_full.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

pub struct PendingHashFeed {
    provider: DynProvider,
    capacity: usize,
    reconnect: ReconnectConfig,
    stats: Arc<FeedStats>,
}

impl PendingHashFeed {
    pub fn new(provider: DynProvider, capacity: usize, reconnect: ReconnectConfig) -> Self {
        Self {
            provider,
            capacity,
            reconnect,
            stats: Arc::new(FeedStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<FeedStats> {
        Arc::clone(&self.stats)
    }

    /// Start the subscription task and hand back the consuming end.
    pub fn spawn(self) -> (mpsc::Receiver<TxHash>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.capacity.max(1));
        let Self {
            provider,
            reconnect,
            stats,
            ..
        } = self;

        let handle = tokio::spawn(async move {
            let mut backoff = reconnect.base_delay;
            loop {
                let sub = match provider.subscribe_pending_transactions().await {
                    Ok(sub) => {
                        info!("Pending tx subscription active");
                        backoff = reconnect.base_delay;
                        sub
                    }
                    Err(err) => {
                        error!(?err, backoff_ms = backoff.as_millis() as u64, "pending subscription failed");
                        sleep(backoff).await;
                        backoff = next_backoff(backoff, reconnect.max_delay);
                        continue;
                    }
                };

                let mut stream = sub.into_stream();
                while let Some(hash) = stream.next().await {
                    if !forward(&tx, hash, &stats) {
                        warn!("Pending feed receiver dropped, stopping subscription");
                        return;
                    }
                }

                stats.reconnects.fetch_add(1, Ordering::Relaxed);
                warn!(backoff_ms = backoff.as_millis() as u64, "pending subscription ended; reconnecting");
                sleep(backoff).await;
                backoff = next_backoff(backoff, reconnect.max_delay);
            }
        });

        (rx, handle)
    }
}
