//! # Pending Journal
//!
//! Admitted but unsettled transactions, checkpointed to `mempool.json` with
//! the same atomic document writer as the account snapshot. On open the
//! ledger re-admits each entry against the settled state, so anything
//! settled or invalidated since the checkpoint is dropped.

use crate::errors::SettlementError;
use lc_01_account_store::write_document;
use serde::{Deserialize, Serialize};
use shared_types::Transaction;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PENDING_JOURNAL_FILE: &str = "mempool.json";

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDocument {
    /// Index of the next block when the checkpoint was taken.
    pub next_block: u64,
    /// In queue order.
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct PendingJournal {
    path: PathBuf,
}

impl PendingJournal {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PENDING_JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, document: &PendingDocument) -> Result<(), SettlementError> {
        let bytes = serde_json::to_vec(document).map_err(|e| SettlementError::Serialization(e.to_string()))?;
        write_document(&self.path, &bytes)?;
        debug!(pending = document.transactions.len(), "pending journal written");
        Ok(())
    }

    /// `None` when no checkpoint was ever written.
    pub fn load(&self) -> Result<Option<PendingDocument>, SettlementError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let unreadable = |message: String| SettlementError::PendingJournal {
            path: self.path.display().to_string(),
            message,
        };
        let bytes = fs::read(&self.path).map_err(|e| unreadable(e.to_string()))?;
        serde_json::from_slice(&bytes).map(Some).map_err(|e| unreadable(e.to_string()))
    }
}
