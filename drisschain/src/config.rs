// Copyright (c) 2024 The Drisschain Developers

use anyhow::{Context, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::numeric;

/// Reward paid to the coinbase of every non-genesis block.
pub const BLOCK_REWARD: u64 = 297_000_000_000_000;

/// Cap on the summed `contractGas` of one block.
pub const BLOCK_GAS_LIMIT: u64 = 50_000_000_000_000;

/// Supply credited to the first account when the chain is bootstrapped.
pub const INITIAL_SUPPLY: u128 = 100_000_000_000_000_000_000_000_000;

/// Target block interval in milliseconds.
pub const BLOCK_TIME_MS: u64 = 30_000;

/// Smallest `gas` a transaction may declare.
pub const MIN_TX_GAS: u64 = 2_000_000_000;

/// Account credited with the initial supply unless configured otherwise.
pub const DEFAULT_FIRST_ACCOUNT: &str =
    "52472d59e3c01bc2cf9496c959d924ce5f469d4e097c395f5605f70633e44a28";

/// Main configuration for a Drisschain node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chain: ChainParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// secp256k1 private key (hex) used for the coinbase address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Overrides the directory holding the ledger (defaults to the config directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port the WebSocket server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address other nodes use to reach this one
    #[serde(default = "default_my_address")]
    pub my_address: String,

    /// Peers dialled at startup (ws:// URLs)
    #[serde(default)]
    pub peers: Vec<String>,

    /// Upper bound on outbound peer connections
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

fn default_port() -> u16 {
    3000
}

fn default_my_address() -> String {
    "ws://localhost:3000".to_string()
}

fn default_max_peers() -> usize {
    3
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            my_address: default_my_address(),
            peers: Vec::new(),
            max_peers: default_max_peers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Whether mining is enabled
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Request the chain block by block from peers at startup
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit `log` instructions executed by contracts
    #[serde(default)]
    pub contract_logs: bool,
}

/// Protocol parameters shared by every node on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    #[serde(default = "default_block_reward", with = "numeric::decimal")]
    pub block_reward: BigUint,

    #[serde(default = "default_block_gas_limit", with = "numeric::decimal")]
    pub block_gas_limit: BigUint,

    #[serde(default = "default_initial_supply", with = "numeric::decimal")]
    pub initial_supply: BigUint,

    #[serde(default = "default_first_account")]
    pub first_account: String,

    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,

    #[serde(default = "default_min_tx_gas", with = "numeric::decimal")]
    pub min_tx_gas: BigUint,

    /// Pins the genesis timestamp so independently started nodes agree on it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_timestamp: Option<u64>,

    /// Leading zero nibbles every block hash needs regardless of difficulty
    #[serde(default = "default_pow_floor_nibbles")]
    pub pow_floor_nibbles: usize,
}

fn default_block_reward() -> BigUint {
    BigUint::from(BLOCK_REWARD)
}

fn default_block_gas_limit() -> BigUint {
    BigUint::from(BLOCK_GAS_LIMIT)
}

fn default_initial_supply() -> BigUint {
    BigUint::from(INITIAL_SUPPLY)
}

fn default_first_account() -> String {
    DEFAULT_FIRST_ACCOUNT.to_string()
}

fn default_block_time_ms() -> u64 {
    BLOCK_TIME_MS
}

fn default_min_tx_gas() -> BigUint {
    BigUint::from(MIN_TX_GAS)
}

fn default_pow_floor_nibbles() -> usize {
    dss_consensus_pow::DEFAULT_FLOOR_NIBBLES
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            block_reward: default_block_reward(),
            block_gas_limit: default_block_gas_limit(),
            initial_supply: default_initial_supply(),
            first_account: default_first_account(),
            block_time_ms: default_block_time_ms(),
            min_tx_gas: default_min_tx_gas(),
            genesis_timestamp: None,
            pow_floor_nibbles: default_pow_floor_nibbles(),
        }
    }
}

impl Config {
    /// Create a new config owning the given private key
    pub fn new(private_key: String) -> Self {
        Self {
            node: NodeConfig {
                private_key: Some(private_key),
                data_dir: None,
            },
            ..Self::default()
        }
    }

    /// Get the private key if one is configured
    pub fn private_key(&self) -> Option<&str> {
        self.node.private_key.as_deref()
    }

    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        // The file holds the node's private key.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// Check if config file exists
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Ledger directory for a node whose config lives at `config_path`
    pub fn ledger_path(&self, config_path: &Path) -> PathBuf {
        match &self.node.data_dir {
            Some(dir) => dir.join("ledger"),
            None => ledger_db_path_from_config(config_path),
        }
    }
}

/// Get the default data directory path
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drisschain")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Get the ledger database path from config file path
pub fn ledger_db_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(config_path)
        .join("ledger")
}
