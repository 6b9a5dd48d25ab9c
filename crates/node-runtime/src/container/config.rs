//! # Node Configuration
//!
//! Aggregates the configuration of every ledger component. Values start from
//! the component defaults, may be replaced wholesale by a JSON file named by
//! `LC_CONFIG`, and are finally adjusted by individual `LC_*` variables.

use crate::genesis::GenesisConfig;
use lc_02_balance_cache::CacheConfig;
use lc_05_security_monitor::SecurityConfig;
use lc_06_settlement::{MempoolConfig, SettlementConfig};
use serde::{Deserialize, Serialize};
use shared_types::{parse_address, DEFAULT_CHAIN_ID};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_FILE_VAR: &str = "LC_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {message}")]
    File { path: String, message: String },

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub chain: ChainConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub mempool: MempoolConfig,
    pub settlement: SettlementConfig,
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `accounts.json`, `chain_tip.json` and the directory lock.
    pub data_dir: PathBuf,
    /// State roots remembered for `state_root_at`.
    pub state_root_history: usize,
    /// How often orphaned proof-trie nodes are collected.
    pub trie_prune_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            state_root_history: 256,
            trie_prune_interval_ms: 30 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

impl NodeConfig {
    /// Reject configurations the components would misbehave under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.chain_id == 0 {
            return Err(ConfigError::Invalid("chain_id must be non-zero".into()));
        }
        self.cache
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.security
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.mempool.max_depth == 0 {
            return Err(ConfigError::Invalid("mempool max_depth must be non-zero".into()));
        }
        if self.settlement.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("settlement tick_interval_ms must be non-zero".into()));
        }
        if self.settlement.batch_size == 0 {
            return Err(ConfigError::Invalid("settlement batch_size must be non-zero".into()));
        }
        if self.settlement.retained_blocks == 0 {
            return Err(ConfigError::Invalid("settlement retained_blocks must be non-zero".into()));
        }
        if self.storage.trie_prune_interval_ms == 0 {
            return Err(ConfigError::Invalid("storage trie_prune_interval_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Apply `LC_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LC_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("LC_CHAIN_ID") {
            self.chain.chain_id = parse_var("LC_CHAIN_ID", &value)?;
        }
        if let Some(value) = lookup("LC_SETTLEMENT_TICK_MS") {
            self.settlement.tick_interval_ms = parse_var("LC_SETTLEMENT_TICK_MS", &value)?;
        }
        if let Some(value) = lookup("LC_SETTLEMENT_BATCH_SIZE") {
            self.settlement.batch_size = parse_var("LC_SETTLEMENT_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("LC_MEMPOOL_MAX_DEPTH") {
            self.mempool.max_depth = parse_var("LC_MEMPOOL_MAX_DEPTH", &value)?;
        }
        if let Some(value) = lookup("LC_FEE_RECIPIENT") {
            let recipient = parse_address(value.trim()).map_err(|e| ConfigError::Env {
                var: "LC_FEE_RECIPIENT",
                message: e.to_string(),
            })?;
            self.settlement.fee_recipient = Some(recipient);
        }
        Ok(())
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: e.to_string(),
    })
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_with(|var| std::env::var(var).ok())
}

/// Defaults, then the `LC_CONFIG` file if named, then `LC_*` overrides.
pub fn load_config_with<F>(lookup: F) -> Result<NodeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match lookup(CONFIG_FILE_VAR) {
        Some(path) => {
            let unreadable = |message: String| ConfigError::File {
                path: path.clone(),
                message,
            };
            let bytes = std::fs::read(&path).map_err(|e| unreadable(e.to_string()))?;
            serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))?
        }
        None => NodeConfig::default(),
    };
    config.apply_env(lookup)?;
    Ok(config)
}
