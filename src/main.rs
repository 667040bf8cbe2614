//! Liquidation Sentinel
//!
//! Main entry point. Connects to the node over WebSocket, verifies the chain
//! and the response contract, then runs the watch loop over the pending
//! transaction feed until SIGINT/SIGTERM.
//!
//! Created: 2026-10-09
//!
//! Connections:
//! - reader WS: transaction lookups, eth_call replay, state reads
//! - feed WS: newPendingTransactions subscription (dedicated, reconnecting)
//! - signer WS: wallet-filled provider for response submission (live mode only)

use alloy::network::EthereumWallet;
use alloy::primitives::TxHash;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use liquidation_sentinel::chain::{
    DryRunSubmitter, FeedStats, PendingHashFeed, ReconnectConfig, ResponseSubmitter, RpcChainReader, RpcSubmitter,
};
use liquidation_sentinel::config::{load_config, SentinelConfig};
use liquidation_sentinel::error::ConfigError;
use liquidation_sentinel::mempool::{HeuristicEngine, WatchLoop};
use liquidation_sentinel::response::{AuditLog, DispatcherSettings, ResponseDispatcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Mempool liquidation sentinel
#[derive(Parser)]
#[command(name = "liquidation-sentinel")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SENTINEL_CONFIG", default_value = "config/sentinel.toml")]
    config: PathBuf,

    /// Force dry-run regardless of the config file
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

async fn connect(url: &str) -> Result<DynProvider> {
    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(url))
        .await
        .with_context(|| format!("WS connect failed: {}", url))?;
    Ok(provider.erased())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Liquidation Sentinel starting...");

    let mut config = load_config(&args.config).context("Failed to load configuration")?;
    if args.dry_run {
        config.signer.dry_run = true;
    }

    let reader_provider = connect(&config.ws_url).await?;
    let chain_id = reader_provider.get_chain_id().await.context("eth_chainId failed")?;
    if chain_id != config.chain_id {
        return Err(ConfigError::ChainMismatch {
            expected: config.chain_id,
            actual: chain_id,
        }
        .into());
    }

    let code = reader_provider
        .get_code_at(config.response_contract)
        .await
        .context("eth_getCode for response contract failed")?;
    if code.is_empty() {
        return Err(ConfigError::InvalidAddress {
            field: "response.contract".to_string(),
            value: format!("{} (no deployed code)", config.response_contract),
        }
        .into());
    }
    let block = reader_provider.get_block_number().await?;
    info!(
        "Connected! chain_id={} block={} response_contract={} watch_set={}",
        chain_id,
        block,
        config.response_contract,
        config.lending_pools.len()
    );

    let feed = PendingHashFeed::new(
        connect(&config.ws_url).await?,
        config.pipeline.queue_capacity,
        ReconnectConfig::default(),
    );
    let feed_stats = feed.stats();
    let (hashes, feed_task) = feed.spawn();

    let reader = Arc::new(RpcChainReader::new(reader_provider));

    let result = if config.signer.dry_run {
        warn!("DRY RUN: responses are logged, not broadcast");
        let submitter = Arc::new(DryRunSubmitter::new(config.response_contract));
        run_sentinel(&config, reader, submitter, hashes, feed_stats).await
    } else {
        let signer = config.signer.signing_key()?;
        info!("Response signer: {}", signer.address());
        let signing_provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_ws(WsConnect::new(&config.ws_url))
            .await
            .context("Signer WS connect failed")?
            .erased();
        let submitter = Arc::new(RpcSubmitter::new(signing_provider, config.response_contract));
        run_sentinel(&config, reader, submitter, hashes, feed_stats).await
    };

    feed_task.abort();
    result
}

async fn run_sentinel<S: ResponseSubmitter + 'static>(
    config: &SentinelConfig,
    reader: Arc<RpcChainReader>,
    submitter: Arc<S>,
    hashes: mpsc::Receiver<TxHash>,
    feed_stats: Arc<FeedStats>,
) -> Result<()> {
    let mut dispatcher = ResponseDispatcher::new(
        submitter,
        config.payload_schema.clone(),
        DispatcherSettings::from_config(config),
    );
    if let Some(path) = &config.audit_log {
        let audit = AuditLog::open(path)?;
        info!("Audit trail: {}", audit.path().display());
        dispatcher = dispatcher.with_audit_log(audit);
    }

    let watch = WatchLoop::new(
        reader,
        HeuristicEngine::from_config(config),
        dispatcher,
        config.pipeline.clone(),
    )
    .with_feed_stats(feed_stats);

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    let shutdown = async move {
        if let Some(sig) = signals.next().await {
            info!("Received signal {}, shutting down", sig);
        }
    };

    let summary = watch.run(ReceiverStream::new(hashes), shutdown).await;
    info!(
        "Sentinel stopped | observed={} suspicious={} dispatched={} failed={}",
        summary.observed, summary.suspicious, summary.dispatched, summary.failed
    );
    Ok(())
}
