//! # Settlement Loop
//!
//! The only writer of balances. Each tick drains a FIFO batch from the
//! mempool, re-validates every transaction against a working set that
//! reflects earlier transactions of the same batch, and commits the result
//! with one durable write:
//!
//! ```text
//! drain ──→ apply (working set) ──→ commit_batch ──┬─ ok ──→ commit nonces
//!                                                  │         invalidate cache
//!                                                  │         seal block, events
//!                                                  └─ err ─→ requeue batch
//! ```

use crate::chain::Chain;
use crate::config::SettlementConfig;
use crate::errors::SettlementError;
use crate::mempool::Mempool;
use lc_01_account_store::AccountStore;
use lc_02_balance_cache::TieredBalanceCache;
use lc_03_transaction_codec::contract_address;
use lc_04_nonce_allocator::NonceAllocator;
use lc_05_security_monitor::SecurityMonitor;
use parking_lot::Mutex;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{keccak256, to_hex, Account, Address, Block, TimeSource, Transaction, U256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a drained transaction was not applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    NonceGap { expected: u64, actual: u64 },
    InsufficientBalance { required: U256, available: U256 },
    Overflow,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NonceGap { expected, actual } => {
                write!(f, "nonce gap: expected {expected}, got {actual}")
            }
            DropReason::InsufficientBalance { required, available } => {
                write!(f, "insufficient balance: {required} required, {available} available")
            }
            DropReason::Overflow => f.write_str("arithmetic overflow"),
        }
    }
}

/// Accounts touched by the batch so far, in first-touch order.
struct WorkingSet<'a> {
    store: &'a AccountStore,
    accounts: HashMap<Address, Account>,
    order: Vec<Address>,
}

impl<'a> WorkingSet<'a> {
    fn new(store: &'a AccountStore) -> Self {
        Self {
            store,
            accounts: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn account(&self, address: &Address) -> Account {
        self.accounts
            .get(address)
            .cloned()
            .unwrap_or_else(|| self.store.get(address))
    }

    fn stage(&mut self, updates: Vec<(Address, Account)>) {
        for (address, account) in updates {
            if self.accounts.insert(address, account).is_none() {
                self.order.push(address);
            }
        }
    }

    fn into_updates(mut self) -> Vec<(Address, Account)> {
        self.order
            .iter()
            .filter_map(|address| self.accounts.remove(address).map(|account| (*address, account)))
            .collect()
    }
}

/// Per-transaction overlay on the working set, so a transaction either
/// applies completely or not at all.
struct Overlay<'w, 'a> {
    base: &'w WorkingSet<'a>,
    updates: Vec<(Address, Account)>,
}

impl Overlay<'_, '_> {
    fn account(&self, address: &Address) -> Account {
        self.updates
            .iter()
            .rev()
            .find(|(staged, _)| staged == address)
            .map(|(_, account)| account.clone())
            .unwrap_or_else(|| self.base.account(address))
    }

    fn credit(&mut self, address: Address, amount: U256) -> Result<Account, DropReason> {
        let mut account = self.account(&address);
        account.balance = account.balance.checked_add(amount).ok_or(DropReason::Overflow)?;
        self.updates.push((address, account.clone()));
        Ok(account)
    }
}

/// Outcome of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub block: Option<Block>,
    pub settled: usize,
    pub dropped: usize,
}

pub struct SettlementLoop {
    config: SettlementConfig,
    store: Arc<AccountStore>,
    cache: Arc<TieredBalanceCache>,
    nonces: Arc<NonceAllocator>,
    mempool: Arc<Mempool>,
    chain: Mutex<Chain>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn TimeSource>,
    security: Option<Arc<SecurityMonitor>>,
    /// Serializes ticks; settlement is the single writer.
    tick_lock: Mutex<()>,
}

impl SettlementLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SettlementConfig,
        store: Arc<AccountStore>,
        cache: Arc<TieredBalanceCache>,
        nonces: Arc<NonceAllocator>,
        mempool: Arc<Mempool>,
        chain: Chain,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            nonces,
            mempool,
            chain: Mutex::new(chain),
            publisher,
            clock,
            security: None,
            tick_lock: Mutex::new(()),
        }
    }

    /// Tell replay detection about transactions dropped at settlement.
    pub fn with_security(mut self, security: Arc<SecurityMonitor>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settle up to `batch_size` pending transactions. On a persistence
    /// failure nothing is committed or released and the batch goes back to
    /// the head of the mempool.
    ///
    /// A chain tip left unpersisted by an earlier tick is written first;
    /// while that keeps failing nothing new is drained.
    pub fn tick(&self) -> Result<TickReport, SettlementError> {
        let _tick = self.tick_lock.lock();
        self.flush_tip()?;
        let batch = self.mempool.drain(self.config.batch_size);
        if batch.is_empty() {
            return Ok(TickReport::default());
        }

        let mut working = WorkingSet::new(&self.store);
        let mut settled = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();
        for tx in &batch {
            match self.apply(&working, tx) {
                Ok(updates) => {
                    working.stage(updates);
                    settled.push(tx.clone());
                }
                Err(reason) => dropped.push((tx.clone(), reason)),
            }
        }

        let updates = working.into_updates();
        if !updates.is_empty() {
            match self.store.commit_batch(&updates) {
                Ok(commit) => {
                    for (address, e) in &commit.trie_failures {
                        warn!(address = %to_hex(address), error = %e, "proof trie update failed");
                    }
                }
                Err(e) => {
                    error!(error = %e, txs = batch.len(), "settlement batch not persisted, requeueing");
                    self.mempool.requeue_front(batch);
                    return Err(SettlementError::Persistence(e));
                }
            }
        }

        for tx in &settled {
            self.nonces.commit(&tx.from, tx.nonce);
        }
        self.cache.invalidate_many(updates.iter().map(|(address, _)| address));

        for (tx, reason) in &dropped {
            self.nonces.release(&tx.from, tx.nonce);
            if let Some(security) = &self.security {
                security.forget_attempt(&tx.from, tx.nonce, &tx.hash);
            }
            warn!(tx_hash = %to_hex(&tx.hash), from = %to_hex(&tx.from), nonce = tx.nonce, %reason, "transaction dropped at settlement");
            self.publisher.publish(LedgerEvent::TransactionDropped {
                hash: tx.hash,
                from: tx.from,
                nonce: tx.nonce,
                reason: reason.to_string(),
            });
        }

        let report = TickReport {
            block: None,
            settled: settled.len(),
            dropped: dropped.len(),
        };
        if settled.is_empty() {
            return Ok(report);
        }

        let block = self.seal(settled)?;
        Ok(TickReport {
            block: Some(block),
            ..report
        })
    }

    fn seal(&self, settled: Vec<Transaction>) -> Result<Block, SettlementError> {
        let block = {
            let mut chain = self.chain.lock();
            let block = chain.seal(settled, self.clock.now())?;
            if let Err(e) = chain.persist_tip() {
                error!(index = block.index, error = %e, "chain tip not persisted, retrying next tick");
            }
            block
        };

        match self.store.record_state_root(block.index) {
            Ok(root) => debug!(index = block.index, state_root = %to_hex(&root), "state root recorded"),
            Err(e) => warn!(index = block.index, error = %e, "state root unavailable"),
        }

        for tx in &block.transactions {
            self.publisher.publish(LedgerEvent::TransactionSettled {
                hash: tx.hash,
                block_index: block.index,
            });
        }
        info!(
            index = block.index,
            hash = %to_hex(&block.hash),
            txs = block.transactions.len(),
            "block sealed"
        );
        self.publisher.publish(LedgerEvent::BlockSealed(block.clone()));
        Ok(block)
    }

    /// Write a tip that an earlier tick sealed but could not persist.
    pub fn flush_tip(&self) -> Result<(), SettlementError> {
        let mut chain = self.chain.lock();
        if !chain.tip_unpersisted() {
            return Ok(());
        }
        chain.persist_tip()?;
        info!(index = chain.next_index().saturating_sub(1), "chain tip persisted on retry");
        Ok(())
    }

    /// Account updates for `tx` on top of `working`, or why it cannot apply.
    fn apply(&self, working: &WorkingSet<'_>, tx: &Transaction) -> Result<Vec<(Address, Account)>, DropReason> {
        let mut overlay = Overlay {
            base: working,
            updates: Vec::with_capacity(3),
        };

        let mut sender = overlay.account(&tx.from);
        if tx.nonce != sender.nonce {
            return Err(DropReason::NonceGap {
                expected: sender.nonce,
                actual: tx.nonce,
            });
        }
        let fee = tx.max_fee().ok_or(DropReason::Overflow)?;
        let required = tx.total_cost().ok_or(DropReason::Overflow)?;
        if sender.balance < required {
            return Err(DropReason::InsufficientBalance {
                required,
                available: sender.balance,
            });
        }
        sender.balance -= required;
        sender.nonce = sender.nonce.checked_add(1).ok_or(DropReason::Overflow)?;
        overlay.updates.push((tx.from, sender));

        match tx.to {
            Some(to) => {
                overlay.credit(to, tx.value)?;
            }
            None => {
                let created = contract_address(&tx.from, tx.nonce);
                let mut contract = overlay.credit(created, tx.value)?;
                contract.code_hash = keccak256(&tx.data);
                overlay.updates.push((created, contract));
                debug!(contract = %to_hex(&created), "contract account created");
            }
        }

        if let Some(recipient) = self.config.fee_recipient {
            overlay.credit(recipient, fee)?;
        }
        Ok(overlay.updates)
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.chain.lock().latest().cloned()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.chain.lock().block(index).cloned()
    }

    pub fn next_block_index(&self) -> u64 {
        self.chain.lock().next_index()
    }
}
