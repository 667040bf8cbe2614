//! Configuration Management
//!
//! Purpose:
//!     Load sentinel settings once at startup from a TOML file, apply `.env`
//!     overrides, and validate everything that can be validated offline.
//!     Every failure is a ConfigError and is fatal; nothing here is re-read
//!     while the process runs.
//!
//! Created: 2026-10-02
//! Modified: 2026-10-06 — payload schema validated against contract argument types
//!
//! Environment overrides (read after `.env` is loaded):
//!     SENTINEL_WS_URL, SENTINEL_CHAIN_ID, SENTINEL_RESPONSE_CONTRACT, SENTINEL_DRY_RUN

use crate::error::ConfigError;
use crate::response::payload::{PayloadSchema, SchemaEntry};
use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

// ---------------------------------------------------------------------------
// TOML structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub network: NetworkSection,
    #[serde(default)]
    pub signer: SignerSection,
    pub response: ResponseSection,
    pub detection: DetectionSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    pub ws_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerSection {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

impl Default for SignerSection {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
            dry_run: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseSection {
    pub contract: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_contract_argument_types")]
    pub contract_argument_types: Vec<String>,
    #[serde(default = "default_payload")]
    pub payload: Vec<SchemaEntry>,
    #[serde(default)]
    pub audit_log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionSection {
    #[serde(default)]
    pub lending_pools: Vec<String>,
    pub value_threshold_eth: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_simulation_timeout_ms")]
    pub simulation_timeout_ms: u64,
    #[serde(default = "default_submission_timeout_ms")]
    pub submission_timeout_ms: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_pipeline_timeout_ms")]
    pub pipeline_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_seen_ttl_secs")]
    pub seen_ttl_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            queue_capacity: default_queue_capacity(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            fetch_retries: default_fetch_retries(),
            simulation_timeout_ms: default_simulation_timeout_ms(),
            submission_timeout_ms: default_submission_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            pipeline_timeout_ms: default_pipeline_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            seen_ttl_secs: default_seen_ttl_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_true() -> bool { true }
fn default_private_key_env() -> String { "SENTINEL_PRIVATE_KEY".to_string() }
fn default_gas_limit() -> u64 { 300_000 }
fn default_max_concurrency() -> usize { 32 }
fn default_queue_capacity() -> usize { 1024 }
fn default_fetch_timeout_ms() -> u64 { 1_500 }
fn default_fetch_retries() -> u32 { 1 }
fn default_simulation_timeout_ms() -> u64 { 2_000 }
fn default_submission_timeout_ms() -> u64 { 3_000 }
fn default_confirmation_timeout_ms() -> u64 { 60_000 }
fn default_pipeline_timeout_ms() -> u64 { 8_000 }
fn default_shutdown_grace_ms() -> u64 { 5_000 }
fn default_seen_ttl_secs() -> u64 { 600 }
fn default_stats_interval_secs() -> u64 { 60 }

fn default_contract_argument_types() -> Vec<String> {
    vec!["address".to_string(), "address".to_string(), "uint256".to_string()]
}

fn default_payload() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::new("collateral", "address"),
        SchemaEntry::new("user", "address"),
        SchemaEntry::new("debtToCover", "uint256"),
    ]
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Signing identity settings. The key itself never lives in the config file.
#[derive(Debug, Clone)]
pub struct SignerConfig {
    pub private_key_env: String,
    pub dry_run: bool,
}

impl SignerConfig {
    /// Read and parse the signing key from the configured env var.
    pub fn signing_key(&self) -> Result<PrivateKeySigner, ConfigError> {
        let raw = std::env::var(&self.private_key_env).map_err(|_| {
            ConfigError::MissingCredential(format!("{} not set", self.private_key_env))
        })?;
        PrivateKeySigner::from_str(raw.trim()).map_err(|e| {
            ConfigError::MissingCredential(format!("{} is not a valid key: {}", self.private_key_env, e))
        })
    }
}

/// Per-stage timeouts and concurrency limits for the watch loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub fetch_timeout: Duration,
    pub fetch_retries: u32,
    pub simulation_timeout: Duration,
    pub submission_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub pipeline_timeout: Duration,
    pub shutdown_grace: Duration,
    pub seen_ttl: Duration,
    pub stats_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_section(&PipelineSection::default())
    }
}

impl PipelineSettings {
    fn from_section(s: &PipelineSection) -> Self {
        Self {
            max_concurrency: s.max_concurrency,
            queue_capacity: s.queue_capacity,
            fetch_timeout: Duration::from_millis(s.fetch_timeout_ms),
            fetch_retries: s.fetch_retries,
            simulation_timeout: Duration::from_millis(s.simulation_timeout_ms),
            submission_timeout: Duration::from_millis(s.submission_timeout_ms),
            confirmation_timeout: Duration::from_millis(s.confirmation_timeout_ms),
            pipeline_timeout: Duration::from_millis(s.pipeline_timeout_ms),
            shutdown_grace: Duration::from_millis(s.shutdown_grace_ms),
            seen_ttl: Duration::from_secs(s.seen_ttl_secs),
            stats_interval: Duration::from_secs(s.stats_interval_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub ws_url: String,
    pub chain_id: u64,
    pub signer: SignerConfig,
    pub response_contract: Address,
    pub response_gas_limit: u64,
    pub payload_schema: PayloadSchema,
    pub audit_log: Option<PathBuf>,
    /// Watch-set of sensitive lending pool addresses, in configured order
    pub lending_pools: Vec<Address>,
    /// Large-value threshold in wei (inclusive)
    pub value_threshold: U256,
    pub pipeline: PipelineSettings,
}

/// Load configuration from a TOML file, applying `.env` and environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SentinelConfig, ConfigError> {
    dotenv::dotenv().ok();

    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut file: FileConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut file)?;

    let config = SentinelConfig::validate(file)?;
    if !config.signer.dry_run {
        // Fail at startup, not at the first response.
        config.signer.signing_key()?;
    }

    info!(
        "Config loaded from {} | chain_id={} | pools={} | threshold={} wei | dry_run={}",
        path.display(),
        config.chain_id,
        config.lending_pools.len(),
        config.value_threshold,
        config.signer.dry_run,
    );
    Ok(config)
}

fn apply_env_overrides(file: &mut FileConfig) -> Result<(), ConfigError> {
    if let Ok(url) = std::env::var("SENTINEL_WS_URL") {
        file.network.ws_url = url;
    }
    if let Ok(raw) = std::env::var("SENTINEL_CHAIN_ID") {
        file.network.chain_id = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "SENTINEL_CHAIN_ID".to_string(),
            reason: format!("'{}' is not an integer", raw),
        })?;
    }
    if let Ok(addr) = std::env::var("SENTINEL_RESPONSE_CONTRACT") {
        file.response.contract = addr;
    }
    if let Ok(raw) = std::env::var("SENTINEL_DRY_RUN") {
        file.signer.dry_run = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
    }
    Ok(())
}

impl SentinelConfig {
    /// Parse and validate a TOML document without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        Self::validate(file)
    }

    pub fn validate(file: FileConfig) -> Result<Self, ConfigError> {
        if file.network.ws_url.trim().is_empty() {
            return Err(invalid("network.ws_url", "must not be empty"));
        }

        let response_contract = parse_address("response.contract", &file.response.contract)?;
        if response_contract == Address::ZERO {
            return Err(invalid("response.contract", "zero address"));
        }
        if file.response.gas_limit == 0 {
            return Err(invalid("response.gas_limit", "must be non-zero"));
        }

        let lending_pools = file
            .detection
            .lending_pools
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_address(&format!("detection.lending_pools[{}]", i), raw))
            .collect::<Result<Vec<_>, _>>()?;
        let mut unique = HashSet::new();
        let lending_pools: Vec<Address> = lending_pools.into_iter().filter(|a| unique.insert(*a)).collect();

        let value_threshold = eth_to_wei(file.detection.value_threshold_eth)?;
        if value_threshold.is_zero() {
            // Every transaction would qualify as large-value.
            return Err(invalid("detection.value_threshold_eth", "must be greater than zero"));
        }

        let payload_schema = PayloadSchema::new(
            file.response.payload.clone(),
            &file.response.contract_argument_types,
        )?;

        let p = &file.pipeline;
        for (field, value) in [
            ("pipeline.max_concurrency", p.max_concurrency as u64),
            ("pipeline.queue_capacity", p.queue_capacity as u64),
            ("pipeline.fetch_timeout_ms", p.fetch_timeout_ms),
            ("pipeline.simulation_timeout_ms", p.simulation_timeout_ms),
            ("pipeline.submission_timeout_ms", p.submission_timeout_ms),
            ("pipeline.confirmation_timeout_ms", p.confirmation_timeout_ms),
            ("pipeline.pipeline_timeout_ms", p.pipeline_timeout_ms),
            ("pipeline.shutdown_grace_ms", p.shutdown_grace_ms),
            ("pipeline.seen_ttl_secs", p.seen_ttl_secs),
            ("pipeline.stats_interval_secs", p.stats_interval_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be non-zero"));
            }
        }

        Ok(Self {
            ws_url: file.network.ws_url,
            chain_id: file.network.chain_id,
            signer: SignerConfig {
                private_key_env: file.signer.private_key_env,
                dry_run: file.signer.dry_run,
            },
            response_contract,
            response_gas_limit: file.response.gas_limit,
            payload_schema,
            audit_log: file.response.audit_log.map(PathBuf::from),
            lending_pools,
            value_threshold,
            pipeline: PipelineSettings::from_section(p),
        })
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw.trim()).map_err(|_| ConfigError::InvalidAddress {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Convert a decimal ether amount into wei.
pub fn eth_to_wei(eth: Decimal) -> Result<U256, ConfigError> {
    if eth.is_sign_negative() {
        return Err(invalid("detection.value_threshold_eth", "must not be negative"));
    }
    parse_ether(&eth.normalize().to_string())
        .map_err(|e| invalid("detection.value_threshold_eth", &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"
[network]
ws_url = "ws://127.0.0.1:8546"
chain_id = 31337

[response]
contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[detection]
lending_pools = ["0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"]
value_threshold_eth = "100"
"#;

    #[test]
    fn test_parse_minimal_config_with_defaults() {
        let config = SentinelConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.chain_id, 31337);
        assert!(config.signer.dry_run);
        assert_eq!(config.response_gas_limit, 300_000);
        assert_eq!(config.lending_pools.len(), 1);
        assert_eq!(config.pipeline.max_concurrency, 32);
        assert_eq!(config.pipeline.simulation_timeout, Duration::from_millis(2_000));
        assert_eq!(config.payload_schema.len(), 3);
        assert!(config.audit_log.is_none());
    }

    #[test]
    fn test_threshold_converted_to_wei() {
        let config = SentinelConfig::from_toml_str(MINIMAL).unwrap();
        let expected = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(config.value_threshold, expected);

        assert_eq!(eth_to_wei(dec!(0.5)).unwrap(), U256::from(500_000_000_000_000_000u64));
        assert_eq!(eth_to_wei(dec!(0)).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let err = eth_to_wei(dec!(-1)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let zero = MINIMAL.replace("value_threshold_eth = \"100\"", "value_threshold_eth = \"0\"");
        let err = SentinelConfig::from_toml_str(&zero).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "detection.value_threshold_eth"));
    }

    #[test]
    fn test_invalid_pool_address_is_fatal() {
        let bad = MINIMAL.replace("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512", "0x1234");
        let err = SentinelConfig::from_toml_str(&bad).unwrap_err();
        match err {
            ConfigError::InvalidAddress { field, value } => {
                assert_eq!(field, "detection.lending_pools[0]");
                assert_eq!(value, "0x1234");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let with_pipeline = format!("{MINIMAL}\n[pipeline]\nmax_concurrency = 0\n");
        let err = SentinelConfig::from_toml_str(&with_pipeline).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "pipeline.max_concurrency"));
    }

    #[test]
    fn test_zero_seen_ttl_and_grace_rejected() {
        let ttl = format!("{MINIMAL}\n[pipeline]\nseen_ttl_secs = 0\n");
        let err = SentinelConfig::from_toml_str(&ttl).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "pipeline.seen_ttl_secs"));

        let grace = format!("{MINIMAL}\n[pipeline]\nshutdown_grace_ms = 0\n");
        let err = SentinelConfig::from_toml_str(&grace).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "pipeline.shutdown_grace_ms"));
    }

    #[test]
    fn test_lending_pools_keep_configured_order() {
        let pools = MINIMAL.replace(
            "lending_pools = [\"0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512\"]",
            "lending_pools = [\"0xffffffffffffffffffffffffffffffffffffffff\", \"0x0000000000000000000000000000000000000001\", \"0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\"]",
        );
        let config = SentinelConfig::from_toml_str(&pools).unwrap();
        assert_eq!(config.lending_pools, vec![Address::repeat_byte(0xff), Address::with_last_byte(1)]);
    }

    #[test]
    fn test_schema_mismatch_with_contract_types_is_fatal() {
        let mismatched = MINIMAL.replace(
            "[detection]",
            "contract_argument_types = [\"address\", \"uint256\"]\n\n[detection]",
        );
        let err = SentinelConfig::from_toml_str(&mismatched).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaMismatch(_)));
    }

    #[test]
    fn test_missing_credential_reported() {
        let signer = SignerConfig {
            private_key_env: "SENTINEL_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            dry_run: false,
        };
        assert!(matches!(signer.signing_key(), Err(ConfigError::MissingCredential(_))));
    }
}
