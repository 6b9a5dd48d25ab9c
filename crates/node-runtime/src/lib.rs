//! # Node Runtime Library
//!
//! Configuration, wiring and task supervision for the ledger node. The
//! `node-runtime` binary is a thin shell around [`NodeRuntime`].

pub mod container;
pub mod genesis;
pub mod runtime;
pub mod tasks;

pub use container::{load_config, ConfigError, LedgerContainer, NodeConfig};
pub use genesis::{GenesisConfig, GenesisError};
pub use runtime::NodeRuntime;
pub use tasks::{PeriodicTask, TaskHandle};
