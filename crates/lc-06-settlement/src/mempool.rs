//! # Mempool
//!
//! FIFO queue of admitted, unsettled transactions with a hash index and a
//! per-sender outflow total. Settlement drains it in arrival order; there is
//! no fee priority.

use crate::config::MempoolConfig;
use crate::errors::MempoolError;
use parking_lot::Mutex;
use shared_types::{to_hex, Address, Hash, Transaction, U256};
use std::collections::{HashMap, VecDeque};
use tracing::trace;

#[derive(Debug, Default)]
struct MempoolInner {
    queue: VecDeque<Hash>,
    by_hash: HashMap<Hash, Transaction>,
    /// Sum of `value + gasPrice * gasLimit` of each sender's pending txs.
    outflow: HashMap<Address, U256>,
}

impl MempoolInner {
    fn index(&mut self, tx: Transaction) {
        let cost = tx.total_cost().unwrap_or(U256::MAX);
        let outflow = self.outflow.entry(tx.from).or_default();
        *outflow = outflow.saturating_add(cost);
        self.by_hash.insert(tx.hash, tx);
    }

    fn unindex(&mut self, hash: &Hash) -> Option<Transaction> {
        let tx = self.by_hash.remove(hash)?;
        let cost = tx.total_cost().unwrap_or(U256::MAX);
        if let Some(outflow) = self.outflow.get_mut(&tx.from) {
            *outflow = outflow.saturating_sub(cost);
            if outflow.is_zero() {
                self.outflow.remove(&tx.from);
            }
        }
        Some(tx)
    }
}

pub struct Mempool {
    config: MempoolConfig,
    inner: Mutex<MempoolInner>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(MempoolInner::default()),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Queue `tx` if the sender's `available` balance covers it on top of
    /// everything the sender already has pending. The check and the insert
    /// happen under one lock.
    pub fn push(&self, tx: Transaction, available: U256) -> Result<(), MempoolError> {
        let mut inner = self.inner.lock();
        if inner.by_hash.contains_key(&tx.hash) {
            return Err(MempoolError::Duplicate(to_hex(&tx.hash)));
        }

        let pending = inner.outflow.get(&tx.from).copied().unwrap_or_default();
        let required = tx
            .total_cost()
            .and_then(|cost| cost.checked_add(pending))
            .unwrap_or(U256::MAX);
        if required > available {
            return Err(MempoolError::InsufficientBalance { required, available });
        }

        if inner.by_hash.len() >= self.config.max_depth {
            return Err(MempoolError::Full {
                max_depth: self.config.max_depth,
            });
        }

        trace!(tx_hash = %to_hex(&tx.hash), depth = inner.queue.len() + 1, "transaction queued");
        inner.queue.push_back(tx.hash);
        inner.index(tx);
        Ok(())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.lock().by_hash.get(hash).cloned()
    }

    /// Remove a pending transaction before settlement.
    pub fn withdraw(&self, hash: &Hash) -> Option<Transaction> {
        let mut inner = self.inner.lock();
        let tx = inner.unindex(hash)?;
        inner.queue.retain(|queued| queued != hash);
        Some(tx)
    }

    pub fn pending_outflow(&self, address: &Address) -> U256 {
        self.inner.lock().outflow.get(address).copied().unwrap_or_default()
    }

    /// Take up to `max` transactions in arrival order.
    pub fn drain(&self, max: usize) -> Vec<Transaction> {
        let mut inner = self.inner.lock();
        let take = max.min(inner.queue.len());
        let hashes: Vec<Hash> = inner.queue.drain(..take).collect();
        hashes.iter().filter_map(|hash| inner.unindex(hash)).collect()
    }

    /// Put a drained batch back at the head of the queue, keeping its order.
    /// Ignores `max_depth`: these transactions were already admitted.
    pub fn requeue_front(&self, batch: Vec<Transaction>) {
        let mut inner = self.inner.lock();
        for tx in batch.into_iter().rev() {
            if inner.by_hash.contains_key(&tx.hash) {
                continue;
            }
            inner.queue.push_front(tx.hash);
            inner.index(tx);
        }
    }

    /// Every pending transaction in arrival order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        inner.queue.iter().filter_map(|hash| inner.by_hash.get(hash).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::TxSignature;

    fn tx(seed: u8, from: u8, nonce: u64, value: u64) -> Transaction {
        Transaction {
            hash: [seed; 32],
            from: [from; 20],
            to: Some([0xEE; 20]),
            value: U256::from(value),
            gas_price: U256::one(),
            gas_limit: 10,
            nonce,
            data: vec![],
            signature: TxSignature {
                v: 27,
                r: [1; 32],
                s: [1; 32],
            },
        }
    }

    fn rich() -> U256 {
        U256::from(1_000_000u64)
    }

    #[test]
    fn test_drains_in_arrival_order() {
        let pool = Mempool::new(MempoolConfig::default());
        for seed in 1..=5 {
            pool.push(tx(seed, seed, 0, 1), rich()).unwrap();
        }
        let first: Vec<u8> = pool.drain(3).iter().map(|t| t.hash[0]).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(pool.len(), 2);
        let rest: Vec<u8> = pool.drain(10).iter().map(|t| t.hash[0]).collect();
        assert_eq!(rest, vec![4, 5]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let pool = Mempool::new(MempoolConfig::default());
        pool.push(tx(1, 1, 0, 1), rich()).unwrap();
        assert!(matches!(pool.push(tx(1, 1, 0, 1), rich()), Err(MempoolError::Duplicate(_))));
    }

    #[test]
    fn test_outflow_counts_against_balance() {
        let pool = Mempool::new(MempoolConfig::default());
        // Each costs 100 + 1 * 10.
        let available = U256::from(220u64);
        pool.push(tx(1, 1, 0, 100), available).unwrap();
        pool.push(tx(2, 1, 1, 100), available).unwrap();
        assert_eq!(pool.pending_outflow(&[1; 20]), U256::from(220u64));
        assert_eq!(
            pool.push(tx(3, 1, 2, 100), available),
            Err(MempoolError::InsufficientBalance {
                required: U256::from(330u64),
                available,
            })
        );
    }

    #[test]
    fn test_max_depth_backpressure() {
        let pool = Mempool::new(MempoolConfig { max_depth: 2 });
        pool.push(tx(1, 1, 0, 1), rich()).unwrap();
        pool.push(tx(2, 2, 0, 1), rich()).unwrap();
        assert_eq!(pool.push(tx(3, 3, 0, 1), rich()), Err(MempoolError::Full { max_depth: 2 }));
    }

    #[test]
    fn test_withdraw_frees_outflow_and_slot() {
        let pool = Mempool::new(MempoolConfig::default());
        pool.push(tx(1, 1, 0, 5), rich()).unwrap();
        pool.push(tx(2, 2, 0, 5), rich()).unwrap();
        let withdrawn = pool.withdraw(&[1; 32]).unwrap();
        assert_eq!(withdrawn.nonce, 0);
        assert!(pool.withdraw(&[1; 32]).is_none());
        assert!(pool.pending_outflow(&[1; 20]).is_zero());
        assert_eq!(pool.drain(10).len(), 1);
    }

    #[test]
    fn test_snapshot_follows_queue_order() {
        let pool = Mempool::new(MempoolConfig::default());
        for seed in 1..=3 {
            pool.push(tx(seed, seed, 0, 1), rich()).unwrap();
        }
        pool.withdraw(&[2; 32]).unwrap();
        let order: Vec<u8> = pool.snapshot().iter().map(|t| t.hash[0]).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_requeue_front_restores_order() {
        let pool = Mempool::new(MempoolConfig::default());
        for seed in 1..=4 {
            pool.push(tx(seed, seed, 0, 1), rich()).unwrap();
        }
        let batch = pool.drain(2);
        pool.requeue_front(batch);
        let order: Vec<u8> = pool.drain(10).iter().map(|t| t.hash[0]).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }
}
