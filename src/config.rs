//! Configuration management for the federator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub federator: FederatorConfig,
    pub mainchain: ChainConfig,
    pub sidechain: ChainConfig,
    pub storage: StorageConfig,
    pub wallet: WalletConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederatorConfig {
    /// Trailing source blocks withheld from processing
    pub confirmations: u64,
    /// First source block scanned when no checkpoint exists
    #[serde(default)]
    pub from_block: u64,
    pub poll_interval_ms: u64,
    /// Run a single cycle and exit, for externally scheduled deployments
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub checkpoint_policy: CheckpointPolicy,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

fn default_send_timeout() -> u64 {
    30
}

fn default_receipt_timeout() -> u64 {
    120
}

/// Which block the last-block checkpoint records after a successful cycle
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// The `toBlock` of the scanned range
    #[default]
    ScannedRange,
    /// The block of the last processed event; unchanged when nothing was found
    LastEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Bridge contract address
    pub bridge: String,
    /// Token address watched (mainchain) or credited (sidechain)
    pub token: String,
    /// Multisig wallet address, required on the sidechain
    pub multisig: Option<String>,
    #[serde(default)]
    pub gas_price_strategy: GasPriceStrategy,
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: u64,
}

fn default_max_gas_price() -> u64 {
    500
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    #[default]
    Legacy,
    Eip1559,
}

impl ChainConfig {
    pub fn bridge_address(&self) -> Result<Address> {
        parse_address(&self.name, "bridge", &self.bridge)
    }

    pub fn token_address(&self) -> Result<Address> {
        parse_address(&self.name, "token", &self.token)
    }

    pub fn multisig_address(&self) -> Result<Address> {
        let raw = self
            .multisig
            .as_deref()
            .with_context(|| format!("Chain {} has no multisig address", self.name))?;
        parse_address(&self.name, "multisig", raw)
    }
}

fn parse_address(chain: &str, field: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw)
        .with_context(|| format!("Chain {} has an invalid {} address: {:?}", chain, field, raw))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory holding the checkpoint files
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    pub database: Option<DatabaseConfig>,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("db")
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from the file named by `FEDERATOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("FEDERATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for chain in [&self.mainchain, &self.sidechain] {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", chain.name);
            }
            chain.bridge_address()?;
            chain.token_address()?;
        }
        self.sidechain.multisig_address()?;

        if self.storage.backend == StorageBackend::Postgres && self.storage.database.is_none() {
            anyhow::bail!("Storage backend postgres requires a [storage.database] section");
        }

        if self.wallet.private_key_env.is_empty() {
            anyhow::bail!("wallet.private_key_env must name an environment variable");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    }

    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}
