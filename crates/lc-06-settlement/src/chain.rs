//! # Chain
//!
//! Append-only sequence of sealed blocks. Only the most recent
//! `retained_blocks` stay in memory; the tip (index and hash) is persisted to
//! `chain_tip.json` so numbering continues across restarts. A tip whose write
//! failed stays marked unpersisted until a later write succeeds.

use crate::errors::SettlementError;
use lc_01_account_store::write_document;
use serde::{Deserialize, Serialize};
use shared_types::{encoding, keccak256, Block, Hash, Timestamp, Transaction, ZERO_HASH};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CHAIN_TIP_FILE: &str = "chain_tip.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub index: u64,
    #[serde(with = "encoding::hex_array")]
    pub hash: Hash,
}

/// Fields covered by the block hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader<'a> {
    index: u64,
    timestamp: Timestamp,
    previous_hash: String,
    transactions: &'a [String],
}

/// keccak256 over the JSON encoding of the header fields and the ordered
/// transaction hashes.
pub fn block_hash(
    index: u64,
    timestamp: Timestamp,
    previous_hash: &Hash,
    transactions: &[Transaction],
) -> Result<Hash, SettlementError> {
    let hashes: Vec<String> = transactions.iter().map(|tx| encoding::to_hex(&tx.hash)).collect();
    let header = BlockHeader {
        index,
        timestamp,
        previous_hash: encoding::to_hex(previous_hash),
        transactions: &hashes,
    };
    let bytes = serde_json::to_vec(&header).map_err(|e| SettlementError::Serialization(e.to_string()))?;
    Ok(keccak256(&bytes))
}

pub struct Chain {
    blocks: VecDeque<Block>,
    retained: usize,
    tip: Option<ChainTip>,
    tip_path: Option<PathBuf>,
    tip_unpersisted: bool,
}

impl Chain {
    pub fn in_memory(retained: usize) -> Self {
        Self {
            blocks: VecDeque::new(),
            retained: retained.max(1),
            tip: None,
            tip_path: None,
            tip_unpersisted: false,
        }
    }

    /// Resume from `<data_dir>/chain_tip.json` if present.
    pub fn open(data_dir: &Path, retained: usize) -> Result<Self, SettlementError> {
        let path = data_dir.join(CHAIN_TIP_FILE);
        let tip = if path.exists() {
            let unreadable = |message: String| SettlementError::ChainTip {
                path: path.display().to_string(),
                message,
            };
            let bytes = fs::read(&path).map_err(|e| unreadable(e.to_string()))?;
            let tip: ChainTip = serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))?;
            info!(index = tip.index, hash = %encoding::to_hex(&tip.hash), "resuming chain");
            Some(tip)
        } else {
            None
        };

        let mut chain = Self::in_memory(retained);
        chain.tip = tip;
        chain.tip_path = Some(path);
        Ok(chain)
    }

    pub fn tip(&self) -> Option<ChainTip> {
        self.tip
    }

    /// Index the next sealed block gets.
    pub fn next_index(&self) -> u64 {
        self.tip.map_or(0, |tip| tip.index + 1)
    }

    /// Seal `transactions` into the next block and append it.
    pub fn seal(&mut self, transactions: Vec<Transaction>, timestamp: Timestamp) -> Result<Block, SettlementError> {
        let index = self.next_index();
        let previous_hash = self.tip.map_or(ZERO_HASH, |tip| tip.hash);
        let hash = block_hash(index, timestamp, &previous_hash, &transactions)?;
        let block = Block {
            index,
            timestamp,
            previous_hash,
            hash,
            transactions,
        };

        if self.blocks.len() == self.retained {
            self.blocks.pop_front();
        }
        self.blocks.push_back(block.clone());
        self.tip = Some(ChainTip { index, hash });
        self.tip_unpersisted = self.tip_path.is_some();
        debug!(index, txs = block.transactions.len(), "block sealed");
        Ok(block)
    }

    /// Durably record the current tip. No-op for in-memory chains.
    pub fn persist_tip(&mut self) -> Result<(), SettlementError> {
        let (Some(path), Some(tip)) = (&self.tip_path, &self.tip) else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(tip).map_err(|e| SettlementError::Serialization(e.to_string()))?;
        write_document(path, &bytes).map_err(|source| SettlementError::TipPersistence {
            index: tip.index,
            source,
        })?;
        self.tip_unpersisted = false;
        Ok(())
    }

    /// Whether the sealed tip is ahead of `chain_tip.json`.
    pub fn tip_unpersisted(&self) -> bool {
        self.tip_unpersisted
    }

    pub fn latest(&self) -> Option<&Block> {
        self.blocks.back()
    }

    /// A retained block by index.
    pub fn block(&self, index: u64) -> Option<&Block> {
        let first = self.blocks.front()?.index;
        let offset = usize::try_from(index.checked_sub(first)?).ok()?;
        self.blocks.get(offset)
    }

    pub fn retained_len(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{TxSignature, U256};

    fn tx(seed: u8) -> Transaction {
        Transaction {
            hash: [seed; 32],
            from: [1; 20],
            to: Some([2; 20]),
            value: U256::one(),
            gas_price: U256::one(),
            gas_limit: 21_000,
            nonce: u64::from(seed),
            data: vec![],
            signature: TxSignature {
                v: 27,
                r: [1; 32],
                s: [1; 32],
            },
        }
    }

    #[test]
    fn test_first_block_links_to_zero_hash() {
        let mut chain = Chain::in_memory(8);
        let genesis = chain.seal(vec![tx(1)], 1_000).unwrap();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, ZERO_HASH);

        let next = chain.seal(vec![tx(2)], 2_000).unwrap();
        assert_eq!(next.index, 1);
        assert_eq!(next.previous_hash, genesis.hash);
        assert_eq!(chain.latest(), Some(&next));
    }

    #[test]
    fn test_hash_depends_on_content() {
        let a = block_hash(0, 1, &ZERO_HASH, &[tx(1)]).unwrap();
        assert_eq!(a, block_hash(0, 1, &ZERO_HASH, &[tx(1)]).unwrap());
        assert_ne!(a, block_hash(0, 1, &ZERO_HASH, &[tx(2)]).unwrap());
        assert_ne!(a, block_hash(0, 2, &ZERO_HASH, &[tx(1)]).unwrap());
        assert_ne!(a, block_hash(1, 1, &ZERO_HASH, &[tx(1)]).unwrap());
    }

    #[test]
    fn test_retention_window() {
        let mut chain = Chain::in_memory(2);
        for i in 0..4 {
            chain.seal(vec![tx(i)], u64::from(i)).unwrap();
        }
        assert_eq!(chain.retained_len(), 2);
        assert!(chain.block(1).is_none());
        assert_eq!(chain.block(2).map(|b| b.index), Some(2));
        assert_eq!(chain.block(3).map(|b| b.index), Some(3));
        assert!(chain.block(4).is_none());
    }

    #[test]
    fn test_tip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut chain = Chain::open(dir.path(), 8).unwrap();
        chain.seal(vec![tx(1)], 10).unwrap();
        let last = chain.seal(vec![tx(2)], 20).unwrap();
        chain.persist_tip().unwrap();

        let mut reopened = Chain::open(dir.path(), 8).unwrap();
        assert_eq!(reopened.next_index(), 2);
        assert!(reopened.latest().is_none());
        let block = reopened.seal(vec![tx(3)], 30).unwrap();
        assert_eq!(block.previous_hash, last.hash);
    }

    #[test]
    fn test_failed_tip_write_stays_pending_until_retried() {
        let dir = tempfile::tempdir().unwrap();
        let tip_path = dir.path().join(CHAIN_TIP_FILE);
        let mut chain = Chain::open(dir.path(), 8).unwrap();
        let first = chain.seal(vec![tx(1)], 10).unwrap();
        assert!(chain.tip_unpersisted());

        // A directory in place of the tip defeats both write paths.
        fs::create_dir(&tip_path).unwrap();
        assert!(matches!(
            chain.persist_tip(),
            Err(SettlementError::TipPersistence { index: 0, .. })
        ));
        assert!(chain.tip_unpersisted());

        fs::remove_dir(&tip_path).unwrap();
        chain.persist_tip().unwrap();
        assert!(!chain.tip_unpersisted());

        let mut reopened = Chain::open(dir.path(), 8).unwrap();
        assert_eq!(reopened.next_index(), 1);
        assert_eq!(reopened.seal(vec![tx(2)], 20).unwrap().previous_hash, first.hash);
    }

    #[test]
    fn test_in_memory_chain_has_nothing_to_persist() {
        let mut chain = Chain::in_memory(4);
        chain.seal(vec![tx(1)], 10).unwrap();
        assert!(!chain.tip_unpersisted());
        chain.persist_tip().unwrap();
    }

    #[test]
    fn test_corrupt_tip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CHAIN_TIP_FILE), b"{not json").unwrap();
        assert!(matches!(
            Chain::open(dir.path(), 8),
            Err(SettlementError::ChainTip { .. })
        ));
    }
}
