//! Demo Transaction Sender
//!
//! Sends a large-value transfer from the node's first unlocked account so the
//! sentinel's large-value rule can be exercised end to end on a dev chain.
//!
//! Usage:
//!   cargo run --bin demo-send-tx -- --config config/sentinel.toml --value-eth 200
//!
//! Created: 2026-10-09

use alloy::network::TransactionBuilder;
use alloy::primitives::utils::format_ether;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::TransactionRequest;
use anyhow::{Context, Result};
use clap::Parser;
use liquidation_sentinel::config::{eth_to_wei, load_config};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "demo-send-tx")]
struct Args {
    #[arg(short, long, env = "SENTINEL_CONFIG", default_value = "config/sentinel.toml")]
    config: PathBuf,

    /// Amount to send, in ether
    #[arg(long, default_value = "200")]
    value_eth: Decimal,

    /// Recipient (defaults to the first configured lending pool)
    #[arg(long)]
    to: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args.config).context("Failed to load configuration")?;

    let to = match &args.to {
        Some(raw) => Address::from_str(raw).with_context(|| format!("invalid --to address: {}", raw))?,
        None => config
            .lending_pools
            .first()
            .copied()
            .context("no --to given and detection.lending_pools is empty")?,
    };
    let value = eth_to_wei(args.value_eth)?;

    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(&config.ws_url))
        .await
        .context("WS connect failed")?;

    let accounts = provider.get_accounts().await.context("eth_accounts failed")?;
    let from = accounts
        .first()
        .copied()
        .context("node exposes no unlocked accounts")?;

    info!("Sending {} ETH from {} to {}", format_ether(value), from, to);
    let request = TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_value(value);

    let pending = provider
        .send_transaction(request)
        .await
        .context("eth_sendTransaction failed")?;
    let tx_hash = *pending.tx_hash();
    info!("Transaction sent: {}", tx_hash);

    let receipt = pending.get_receipt().await.context("waiting for receipt failed")?;
    info!(
        "Transaction mined in block {:?} (status: {})",
        receipt.block_number,
        if receipt.status() { "success" } else { "reverted" }
    );
    Ok(())
}
