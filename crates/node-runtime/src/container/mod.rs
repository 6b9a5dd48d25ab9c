//! # Ledger Container
//!
//! Configuration and construction of the ledger components. Everything is
//! built once and shared through `Arc`.

pub mod config;
pub mod ledger;

pub use config::{load_config, load_config_with, ChainConfig, ConfigError, NodeConfig, StorageConfig};
pub use ledger::LedgerContainer;
