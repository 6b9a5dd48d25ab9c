//! # Ledger Service
//!
//! Facade the RPC layer talks to. Owns the admission pipeline:
//!
//! 1. decode and recover the sender (strict, no fallback attribution)
//! 2. blocklist, then self-transfer
//! 3. rate limit, then replay detection
//! 4. duplicate hash
//! 5. nonce reservation
//! 6. balance, including the sender's pending outflow, then mempool push
//!
//! Every gate runs before any state is mutated; a failure after step 5
//! releases the reservation. A nonce handed back without settling is also
//! forgotten by replay detection, so resubmitting it is not a double spend.
//!
//! With a [`PendingJournal`] attached, the mempool is checkpointed after
//! every settlement tick and re-admitted against settled state on open.

use crate::adapters::StoreNonceSource;
use crate::chain::Chain;
use crate::config::{MempoolConfig, SettlementConfig};
use crate::errors::{AdmissionError, MempoolError, SettlementError};
use crate::journal::{PendingDocument, PendingJournal};
use crate::mempool::Mempool;
use crate::settlement::{SettlementLoop, TickReport};
use lc_01_account_store::{AccountProof, AccountStore, TrieError};
use lc_02_balance_cache::TieredBalanceCache;
use lc_03_transaction_codec::{CodecError, TransactionCodec};
use lc_04_nonce_allocator::{NonceAllocator, NonceError};
use lc_05_security_monitor::SecurityMonitor;
use parking_lot::Mutex;
use serde_json::json;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{to_hex, Account, Address, AlertType, Block, Hash, TimeSource, Transaction, U256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Components and settings a [`LedgerService`] is assembled from.
pub struct LedgerParts {
    pub chain_id: u64,
    pub store: Arc<AccountStore>,
    pub cache: Arc<TieredBalanceCache>,
    pub security: Arc<SecurityMonitor>,
    pub publisher: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn TimeSource>,
    pub chain: Chain,
    pub mempool: MempoolConfig,
    pub settlement: SettlementConfig,
}

pub struct LedgerService {
    codec: TransactionCodec,
    store: Arc<AccountStore>,
    cache: Arc<TieredBalanceCache>,
    nonces: Arc<NonceAllocator>,
    security: Arc<SecurityMonitor>,
    mempool: Arc<Mempool>,
    settlement: SettlementLoop,
    publisher: Arc<dyn EventPublisher>,
    journal: Option<PendingJournal>,
    /// Set whenever the mempool changes; cleared by a checkpoint.
    pending_dirty: AtomicBool,
    checkpoint_lock: Mutex<()>,
}

impl LedgerService {
    pub fn new(parts: LedgerParts) -> Self {
        let nonces = Arc::new(NonceAllocator::new(Arc::new(StoreNonceSource(parts.store.clone()))));
        let mempool = Arc::new(Mempool::new(parts.mempool));
        let settlement = SettlementLoop::new(
            parts.settlement,
            parts.store.clone(),
            parts.cache.clone(),
            nonces.clone(),
            mempool.clone(),
            parts.chain,
            parts.publisher.clone(),
            parts.clock,
        )
        .with_security(parts.security.clone());
        Self {
            codec: TransactionCodec::new(parts.chain_id),
            store: parts.store,
            cache: parts.cache,
            nonces,
            security: parts.security,
            mempool,
            settlement,
            publisher: parts.publisher,
            journal: None,
            pending_dirty: AtomicBool::new(false),
            checkpoint_lock: Mutex::new(()),
        }
    }

    /// Checkpoint the mempool to `journal`. Call [`Self::restore_pending`]
    /// afterwards to pick up an existing checkpoint.
    pub fn with_pending_journal(mut self, journal: PendingJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Admit a hex-encoded signed transaction. Returns its hash.
    pub fn submit_raw_transaction(&self, raw_hex: &str) -> Result<Hash, AdmissionError> {
        let tx = self.codec.decode_hex_and_recover(raw_hex).map_err(log_rejected_bytes)?;
        self.admit(tx)
    }

    pub fn submit_raw_bytes(&self, raw: &[u8]) -> Result<Hash, AdmissionError> {
        let tx = self.codec.decode_and_recover(raw).map_err(log_rejected_bytes)?;
        self.admit(tx)
    }

    fn admit(&self, tx: Transaction) -> Result<Hash, AdmissionError> {
        let sender = tx.from;
        let address = to_hex(&sender);

        self.security.check_blocked(&sender)?;
        if tx.to == Some(sender) {
            self.security.flag(
                &sender,
                AlertType::SelfTransfer,
                1,
                json!({ "txHash": to_hex(&tx.hash), "nonce": tx.nonce }),
            );
            return Err(AdmissionError::SelfTransfer { address });
        }
        self.security.check_rate(&sender)?;
        self.security.check_replay(&sender, tx.nonce, &tx.hash)?;

        if self.mempool.contains(&tx.hash) {
            return Err(AdmissionError::DuplicateTransaction(to_hex(&tx.hash)));
        }
        let (hash, nonce) = (tx.hash, tx.nonce);
        if let Err(e) = self.nonces.reserve(&sender, nonce) {
            // A gap never touched a reservation; only conflicts are replays.
            if matches!(e, NonceError::Gap { .. }) {
                self.security.forget_attempt(&sender, nonce, &hash);
            }
            return Err(e.into());
        }

        if let Err(e) = self.fund_and_queue(tx) {
            self.nonces.release(&sender, nonce);
            self.security.forget_attempt(&sender, nonce, &hash);
            debug!(tx_hash = %to_hex(&hash), error = %e, "admission failed after reservation");
            return Err(e);
        }

        self.pending_dirty.store(true, Ordering::Release);
        info!(tx_hash = %to_hex(&hash), from = %address, nonce, "transaction admitted");
        self.publisher.publish(LedgerEvent::TransactionAdmitted {
            hash,
            from: sender,
            nonce,
        });
        Ok(hash)
    }

    fn fund_and_queue(&self, tx: Transaction) -> Result<(), AdmissionError> {
        let sender = tx.from;
        let available = self.store.try_get(&sender)?.unwrap_or_default().balance;
        match self.mempool.push(tx, available) {
            Ok(()) => Ok(()),
            Err(MempoolError::InsufficientBalance { required, available }) => {
                let reason = format!("{required} required, {available} available");
                if let Err(e) = self.security.check_balance_manipulation(&sender, &reason) {
                    warn!(address = %to_hex(&sender), error = %e, "repeated insufficient balance");
                }
                Err(AdmissionError::InsufficientBalance {
                    address: to_hex(&sender),
                    required,
                    available,
                })
            }
            Err(MempoolError::Duplicate(hash)) => Err(AdmissionError::DuplicateTransaction(hash)),
            Err(MempoolError::Full { max_depth }) => {
                warn!(max_depth, "mempool full, rejecting admission");
                Err(AdmissionError::MempoolFull { max_depth })
            }
        }
    }

    /// Remove a pending transaction and free its nonce. `None` once it has
    /// been drained for settlement.
    pub fn withdraw_transaction(&self, hash: &Hash) -> Option<Transaction> {
        let tx = self.mempool.withdraw(hash)?;
        self.nonces.release(&tx.from, tx.nonce);
        self.security.forget_attempt(&tx.from, tx.nonce, hash);
        self.pending_dirty.store(true, Ordering::Release);
        info!(tx_hash = %to_hex(hash), from = %to_hex(&tx.from), nonce = tx.nonce, "transaction withdrawn");
        self.publisher.publish(LedgerEvent::TransactionWithdrawn { hash: *hash });
        Some(tx)
    }

    /// Settled balance, read through the cache.
    pub fn get_balance(&self, address: &Address) -> U256 {
        let loaded = self.cache.get_or_load(address, |address| {
            self.store.try_get(address).map(|account| account.unwrap_or_default().balance)
        });
        loaded.unwrap_or_else(|e| {
            warn!(address = %to_hex(address), error = %e, "balance read failed");
            U256::zero()
        })
    }

    /// Next nonce for `address`, counting pending transactions.
    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.nonces.get_nonce(address)
    }

    pub fn get_account(&self, address: &Address) -> Account {
        self.store.get(address)
    }

    pub fn create_proof(&self, address: &Address) -> Result<Option<AccountProof>, TrieError> {
        self.store.create_proof(address)
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.settlement.latest_block()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.settlement.block(index)
    }

    /// Index the next sealed block will get.
    pub fn next_block_index(&self) -> u64 {
        self.settlement.next_block_index()
    }

    pub fn pending_count(&self) -> usize {
        self.mempool.len()
    }

    pub fn pending_transaction(&self, hash: &Hash) -> Option<Transaction> {
        self.mempool.get(hash)
    }

    /// Run one settlement tick, then checkpoint the mempool if it changed.
    /// A failed checkpoint is logged and retried on the next tick.
    pub fn settle(&self) -> Result<TickReport, SettlementError> {
        let report = self.settlement.tick()?;
        if report.settled > 0 || report.dropped > 0 {
            self.pending_dirty.store(true, Ordering::Release);
        }
        if let Err(e) = self.save_pending() {
            warn!(error = %e, "pending journal not written, retrying next tick");
        }
        Ok(report)
    }

    /// Write the mempool to the pending journal if it changed since the last
    /// checkpoint. Returns the number of transactions written, `None` when
    /// there was nothing to write.
    pub fn save_pending(&self) -> Result<Option<usize>, SettlementError> {
        let Some(journal) = &self.journal else {
            return Ok(None);
        };
        let _checkpoint = self.checkpoint_lock.lock();
        if !self.pending_dirty.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        let document = PendingDocument {
            next_block: self.settlement.next_block_index(),
            transactions: self.mempool.snapshot(),
        };
        if let Err(e) = journal.save(&document) {
            self.pending_dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(Some(document.transactions.len()))
    }

    /// Re-admit the last checkpoint in queue order. Entries from a blocked
    /// sender, whose nonce no longer follows settled state, or that the
    /// settled balance no longer covers are dropped. Returns how many were
    /// restored.
    pub fn restore_pending(&self) -> Result<usize, SettlementError> {
        let Some(journal) = &self.journal else {
            return Ok(0);
        };
        let Some(document) = journal.load()? else {
            return Ok(0);
        };

        let total = document.transactions.len();
        let mut restored = 0;
        for tx in document.transactions {
            let hash = tx.hash;
            match self.readmit(tx) {
                Ok(()) => restored += 1,
                Err(e) => info!(tx_hash = %to_hex(&hash), error = %e, "checkpointed transaction dropped"),
            }
        }
        self.pending_dirty.store(true, Ordering::Release);
        info!(
            restored,
            dropped = total - restored,
            checkpoint_block = document.next_block,
            "pending transactions restored"
        );
        Ok(restored)
    }

    /// Admission for a transaction the ledger already accepted once: the
    /// signature was checked then, and the rate and replay gates do not
    /// apply.
    fn readmit(&self, tx: Transaction) -> Result<(), AdmissionError> {
        let (sender, nonce) = (tx.from, tx.nonce);
        self.security.check_blocked(&sender)?;
        if self.mempool.contains(&tx.hash) {
            return Err(AdmissionError::DuplicateTransaction(to_hex(&tx.hash)));
        }
        self.nonces.reserve(&sender, nonce)?;

        let queued = self
            .store
            .try_get(&sender)
            .map_err(AdmissionError::from)
            .and_then(|account| {
                let available = account.unwrap_or_default().balance;
                self.mempool.push(tx, available).map_err(|e| match e {
                    MempoolError::InsufficientBalance { required, available } => AdmissionError::InsufficientBalance {
                        address: to_hex(&sender),
                        required,
                        available,
                    },
                    MempoolError::Duplicate(hash) => AdmissionError::DuplicateTransaction(hash),
                    MempoolError::Full { max_depth } => AdmissionError::MempoolFull { max_depth },
                })
            });
        if queued.is_err() {
            self.nonces.release(&sender, nonce);
        }
        queued
    }

    /// Retry a chain tip write that failed after sealing.
    pub fn flush_chain_tip(&self) -> Result<(), SettlementError> {
        self.settlement.flush_tip()
    }

    pub fn chain_id(&self) -> u64 {
        self.codec.chain_id()
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TieredBalanceCache> {
        &self.cache
    }

    pub fn security(&self) -> &Arc<SecurityMonitor> {
        &self.security
    }

    pub fn nonces(&self) -> &Arc<NonceAllocator> {
        &self.nonces
    }
}

fn log_rejected_bytes(e: CodecError) -> AdmissionError {
    debug!(error = %e, "raw transaction rejected");
    e.into()
}
