//! # Account Store Service
//!
//! Wraps the canonical map (any [`KeyValueStore`], a [`SnapshotStore`] in
//! production) and the secondary [`ProofTrie`].

use crate::adapters::{DataDirLock, MemoryKvStore, SnapshotStore};
use crate::domain::{
    decode_account_rlp, encode_account_rlp, verify_proof, AccountProof, AccountRecord, ProofTrie,
    StateRootEntry, StoreError, StoreStats, TrieError,
};
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::{Mutex, MutexGuard, RwLock};
use shared_types::{to_hex, Account, Address, Hash, U256};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the canonical document inside the data directory.
pub const SNAPSHOT_FILE: &str = "accounts.json";

/// Default number of per-block state roots kept.
pub const DEFAULT_ROOT_HISTORY: usize = 256;

/// Outcome of [`AccountStore::commit_batch`]. The canonical write succeeded;
/// the listed proof-trie updates did not.
#[derive(Debug, Default)]
pub struct BatchCommit {
    pub trie_failures: Vec<(Address, TrieError)>,
}

impl BatchCommit {
    pub fn is_clean(&self) -> bool {
        self.trie_failures.is_empty()
    }
}

/// The proof trie and its relation to the canonical map.
struct TrieSlot {
    trie: ProofTrie<MemoryKvStore>,
    /// `true` once the trie mirrors the canonical map.
    built: bool,
    /// Bumped on every invalidation; a rebuild begun in an older epoch is
    /// discarded.
    epoch: u64,
    /// Addresses written while a rebuild scans the canonical map.
    touched: Option<Vec<Address>>,
}

impl TrieSlot {
    fn invalidate(&mut self) {
        self.built = false;
        self.epoch += 1;
    }

    fn note_write(&mut self, address: &Address) {
        if let Some(touched) = self.touched.as_mut() {
            touched.push(*address);
        }
    }
}

pub struct AccountStore {
    canonical: Arc<dyn KeyValueStore>,
    /// Set when the canonical map is a snapshot document (backup/restore).
    snapshot: Option<Arc<SnapshotStore>>,
    /// Held only for single trie operations, never across a rebuild scan.
    trie: Mutex<TrieSlot>,
    /// Serializes rebuilds.
    rebuild_lock: Mutex<()>,
    root_history: RwLock<VecDeque<StateRootEntry>>,
    root_history_len: usize,
    _lock: Option<DataDirLock>,
}

impl AccountStore {
    /// Open (or create) the ledger in `data_dir`, taking the directory lock.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::DataDir(e.to_string()))?;
        let lock = DataDirLock::acquire(data_dir).map_err(|e| StoreError::DataDir(e.to_string()))?;
        let snapshot = Arc::new(SnapshotStore::open(data_dir.join(SNAPSHOT_FILE))?);
        let mut store = Self::with_backend(snapshot.clone());
        store.snapshot = Some(snapshot);
        store._lock = Some(lock);
        Ok(store)
    }

    /// Store over an arbitrary canonical backend.
    pub fn with_backend(canonical: Arc<dyn KeyValueStore>) -> Self {
        Self {
            canonical,
            snapshot: None,
            trie: Mutex::new(TrieSlot {
                trie: ProofTrie::in_memory(),
                built: false,
                epoch: 0,
                touched: None,
            }),
            rebuild_lock: Mutex::new(()),
            root_history: RwLock::new(VecDeque::new()),
            root_history_len: DEFAULT_ROOT_HISTORY,
            _lock: None,
        }
    }

    /// Volatile store, for tests and tools.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryKvStore::new()))
    }

    pub fn with_root_history(mut self, len: usize) -> Self {
        self.root_history_len = len.max(1);
        self
    }

    /// Account at `address`, or the zero account. Never fails: a read or
    /// parse error is logged and reads as absent.
    pub fn get(&self, address: &Address) -> Account {
        match self.try_get(address) {
            Ok(account) => account.unwrap_or_default(),
            Err(e) => {
                warn!(address = %to_hex(address), error = %e, "account read failed, using zero account");
                Account::default()
            }
        }
    }

    pub fn try_get(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        self.canonical
            .get(address)?
            .map(|bytes| decode_record(address, &bytes))
            .transpose()
    }

    /// Durable write of one account. Returns once the canonical document is
    /// on disk; the proof trie is updated afterwards and never fails the put.
    pub fn put(&self, address: &Address, account: &Account) -> Result<(), StoreError> {
        self.canonical.put(address, encode_record(account)?)?;
        if let Err(e) = self.update_auxiliary_proof_trie(address, account) {
            warn!(address = %to_hex(address), error = %e, "proof trie update failed");
        }
        Ok(())
    }

    /// Apply several account writes with a single durable write.
    pub fn commit_batch(&self, updates: &[(Address, Account)]) -> Result<BatchCommit, StoreError> {
        let operations = updates
            .iter()
            .map(|(address, account)| Ok(BatchOperation::put(address.to_vec(), encode_record(account)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.canonical.batch(operations)?;

        let mut commit = BatchCommit::default();
        for (address, account) in updates {
            if let Err(e) = self.update_auxiliary_proof_trie(address, account) {
                commit.trie_failures.push((*address, e));
            }
        }
        debug!(accounts = updates.len(), trie_failures = commit.trie_failures.len(), "batch committed");
        Ok(commit)
    }

    pub fn delete(&self, address: &Address) -> Result<(), StoreError> {
        self.canonical.delete(address)?;
        let mut slot = self.trie.lock();
        slot.note_write(address);
        if slot.built {
            if let Err(e) = slot.trie.remove(address) {
                warn!(address = %to_hex(address), error = %e, "proof trie removal failed");
                slot.invalidate();
            }
        }
        Ok(())
    }

    /// Mirror one account into the proof trie. Skipped while the trie is not
    /// built: the next rebuild reads the canonical map anyway. A failure
    /// marks the trie for rebuild.
    pub fn update_auxiliary_proof_trie(&self, address: &Address, account: &Account) -> Result<(), TrieError> {
        let mut slot = self.trie.lock();
        slot.note_write(address);
        if !slot.built {
            return Ok(());
        }
        let result = slot.trie.insert(address, encode_account_rlp(account));
        if result.is_err() {
            slot.invalidate();
        }
        result
    }

    /// Rebuild the proof trie from the canonical map. Malformed keys and
    /// records are skipped. Returns the number of accounts in the trie.
    ///
    /// The scan fills a fresh trie without holding the trie lock, so writes
    /// keep flowing; accounts written meanwhile are re-read from the
    /// canonical map before the fresh trie is swapped in.
    pub fn rebuild_proof_trie(&self) -> Result<usize, TrieError> {
        self.rebuild(true)
    }

    fn rebuild(&self, force: bool) -> Result<usize, TrieError> {
        let _rebuild = self.rebuild_lock.lock();
        loop {
            let epoch = {
                let mut slot = self.trie.lock();
                if slot.built && !force {
                    return Ok(0);
                }
                slot.touched = Some(Vec::new());
                slot.epoch
            };

            let fresh = ProofTrie::in_memory();
            let scanned = self.fill(&fresh);
            let mut slot = self.trie.lock();
            let touched = slot.touched.take().unwrap_or_default();
            let mut count = scanned?;
            if slot.epoch != epoch {
                debug!("proof trie invalidated during rebuild, scanning again");
                continue;
            }
            for address in touched {
                count = self.mirror(&fresh, &address, count)?;
            }

            slot.trie = fresh;
            slot.built = true;
            info!(accounts = count, root = %to_hex(&slot.trie.root_hash()), "proof trie rebuilt");
            return Ok(count);
        }
    }

    /// Insert every readable canonical account into `trie`.
    fn fill(&self, trie: &ProofTrie<MemoryKvStore>) -> Result<usize, TrieError> {
        let mut count = 0;
        for (key, value) in self.canonical.prefix_scan(&[])? {
            let Ok(address) = Address::try_from(key.as_slice()) else {
                warn!(key = %to_hex(&key), "skipping malformed address during trie rebuild");
                continue;
            };
            match decode_record(&address, &value) {
                Ok(account) => {
                    trie.insert(&address, encode_account_rlp(&account))?;
                    count += 1;
                }
                Err(e) => warn!(address = %to_hex(&address), error = %e, "skipping malformed record during trie rebuild"),
            }
        }
        Ok(count)
    }

    /// Bring `address` in `trie` in line with the canonical map. Returns the
    /// adjusted account count.
    fn mirror(&self, trie: &ProofTrie<MemoryKvStore>, address: &Address, count: usize) -> Result<usize, TrieError> {
        let present = trie.get_value(address)?.is_some();
        let current = self.canonical.get(address)?.map(|bytes| decode_record(address, &bytes));
        match current {
            Some(Ok(account)) => {
                trie.insert(address, encode_account_rlp(&account))?;
                Ok(if present { count } else { count + 1 })
            }
            Some(Err(e)) => {
                warn!(address = %to_hex(address), error = %e, "skipping malformed record during trie rebuild");
                trie.remove(address)?;
                Ok(if present { count - 1 } else { count })
            }
            None => {
                trie.remove(address)?;
                Ok(if present { count - 1 } else { count })
            }
        }
    }

    fn ensure_trie(&self) -> Result<MutexGuard<'_, TrieSlot>, TrieError> {
        loop {
            let slot = self.trie.lock();
            if slot.built {
                return Ok(slot);
            }
            drop(slot);
            self.rebuild(false)?;
        }
    }

    pub fn is_trie_built(&self) -> bool {
        self.trie.lock().built
    }

    /// Current proof-trie root, rebuilding the trie first if needed.
    pub fn state_root(&self) -> Result<Hash, TrieError> {
        Ok(self.ensure_trie()?.trie.root_hash())
    }

    /// Proof for `address`. `Ok(None)` if the trie holds no such account.
    pub fn create_proof(&self, address: &Address) -> Result<Option<AccountProof>, TrieError> {
        let slot = self.ensure_trie()?;
        let Some(value) = slot.trie.get_value(address)? else {
            return Ok(None);
        };
        Ok(Some(AccountProof {
            address: *address,
            account: Some(decode_account_rlp(&value)?),
            proof_nodes: slot.trie.prove(address)?,
            state_root: slot.trie.root_hash(),
        }))
    }

    /// Check that `proof` commits `address` to `proof.account` under `root`.
    pub fn verify_proof(&self, address: &Address, proof: &AccountProof, root: &Hash) -> bool {
        if proof.address != *address {
            return false;
        }
        match verify_proof(root, address, &proof.proof_nodes) {
            Ok(Some(value)) => match (decode_account_rlp(&value), &proof.account) {
                (Ok(proven), Some(claimed)) => encode_account_rlp(&proven) == encode_account_rlp(claimed),
                _ => false,
            },
            Ok(None) => proof.account.is_none(),
            Err(e) => {
                debug!(address = %to_hex(address), error = %e, "proof rejected");
                false
            }
        }
    }

    /// Remember the state root after block `block_index` was sealed.
    pub fn record_state_root(&self, block_index: u64) -> Result<Hash, TrieError> {
        let state_root = self.state_root()?;
        let mut history = self.root_history.write();
        history.push_back(StateRootEntry {
            block_index,
            state_root,
        });
        while history.len() > self.root_history_len {
            history.pop_front();
        }
        Ok(state_root)
    }

    pub fn state_root_at(&self, block_index: u64) -> Option<Hash> {
        self.root_history
            .read()
            .iter()
            .rev()
            .find(|entry| entry.block_index == block_index)
            .map(|entry| entry.state_root)
    }

    /// Drop trie nodes replaced by earlier updates.
    pub fn prune_proof_trie(&self) -> Result<usize, TrieError> {
        let slot = self.trie.lock();
        if !slot.built {
            return Ok(0);
        }
        let removed = slot.trie.prune()?;
        debug!(removed, "proof trie pruned");
        Ok(removed)
    }

    /// Every readable account, ordered by address.
    pub fn all_accounts(&self) -> Result<Vec<(Address, Account)>, StoreError> {
        let mut accounts: Vec<(Address, Account)> = self
            .canonical
            .prefix_scan(&[])?
            .into_iter()
            .filter_map(|(key, value)| {
                let address = Address::try_from(key.as_slice()).ok()?;
                match decode_record(&address, &value) {
                    Ok(account) => Some((address, account)),
                    Err(e) => {
                        warn!(address = %to_hex(&address), error = %e, "skipping unreadable account");
                        None
                    }
                }
            })
            .collect();
        accounts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(accounts)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let accounts = self.all_accounts()?;
        let total_balance = accounts
            .iter()
            .fold(U256::zero(), |sum, (_, account)| sum.saturating_add(account.balance));
        let state_root = match self.state_root() {
            Ok(root) => Some(root),
            Err(e) => {
                warn!(error = %e, "state root unavailable");
                None
            }
        };
        Ok(StoreStats {
            total_accounts: accounts.len(),
            total_balance,
            state_root,
        })
    }

    /// Copy the snapshot document to `destination`.
    pub fn backup(&self, destination: &Path) -> Result<(), StoreError> {
        self.snapshot_store()?.export_to(destination)?;
        info!(to = %destination.display(), "account snapshot backed up");
        Ok(())
    }

    /// Replace every account with the contents of a backup document.
    pub fn restore(&self, source: &Path) -> Result<usize, StoreError> {
        let count = self.snapshot_store()?.replace_from(source)?;
        self.trie.lock().invalidate();
        Ok(count)
    }

    fn snapshot_store(&self) -> Result<&SnapshotStore, StoreError> {
        self.snapshot
            .as_deref()
            .ok_or_else(|| StoreError::DataDir("store is not backed by a snapshot document".into()))
    }
}

fn encode_record(account: &Account) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&AccountRecord::from(account)).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_record(address: &Address, bytes: &[u8]) -> Result<Account, StoreError> {
    let record: AccountRecord =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    record.to_account(&to_hex(address))
}
