//! # Genesis Allocations
//!
//! Seeds balances into a brand-new data directory. A directory that already
//! holds accounts or a chain tip is never touched again.

use lc_01_account_store::{AccountStore, StoreError};
use serde::{Deserialize, Serialize};
use shared_types::{parse_address, parse_units, to_hex, Account, Address};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("Invalid genesis address {0}")]
    InvalidAddress(String),

    #[error("Invalid genesis amount for {address}: {message}")]
    InvalidAmount { address: String, message: String },

    #[error("Failed to store genesis state: {0}")]
    StateInitFailed(#[from] StoreError),
}

/// Balances credited when the node starts on an empty data directory.
/// Keys are `0x` addresses, values decimal coin amounts such as `"1000.5"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub allocations: BTreeMap<String, String>,
}

impl GenesisConfig {
    /// Parse every allocation, failing on the first bad entry.
    pub fn accounts(&self) -> Result<Vec<(Address, Account)>, GenesisError> {
        self.allocations
            .iter()
            .map(|(address, amount)| {
                let parsed = parse_address(address.trim())
                    .map_err(|_| GenesisError::InvalidAddress(address.clone()))?;
                let balance = parse_units(amount.trim()).map_err(|e| GenesisError::InvalidAmount {
                    address: address.clone(),
                    message: e.to_string(),
                })?;
                Ok((parsed, Account::with_balance(balance)))
            })
            .collect()
    }
}

/// Credit the configured allocations if `fresh` and there is anything to
/// credit. Returns the number of accounts written.
pub fn apply_genesis(store: &AccountStore, config: &GenesisConfig, fresh: bool) -> Result<usize, GenesisError> {
    let accounts = config.accounts()?;
    if !fresh || accounts.is_empty() {
        return Ok(0);
    }
    if store.stats()?.total_accounts > 0 {
        return Ok(0);
    }

    store.commit_batch(&accounts)?;
    for (address, account) in &accounts {
        info!(address = %to_hex(address), balance = %account.balance, "genesis allocation");
    }
    Ok(accounts.len())
}
