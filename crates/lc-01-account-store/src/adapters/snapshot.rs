//! # Snapshot Store
//!
//! Canonical account map persisted as one JSON document:
//!
//! ```json
//! { "0x<40 hex>": { "nonce": "1", "balance": "8999580000000000000",
//!                   "storageRoot": "0x…", "codeHash": "0x…" } }
//! ```
//!
//! Every mutation rewrites the whole document: `<file>.tmp` + `sync_all` +
//! rename. If that fails the document is written in place. The in-memory
//! map only changes once a write has succeeded.

use crate::domain::{AccountRecord, StoreError};
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::{Mutex, RwLock};
use shared_types::{parse_address, to_hex, Address};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

type AccountMap = BTreeMap<Address, AccountRecord>;

pub struct SnapshotStore {
    path: PathBuf,
    accounts: RwLock<AccountMap>,
    /// Serializes writers; readers only wait for the final swap.
    writer: Mutex<()>,
}

impl SnapshotStore {
    /// Open the document at `path`, creating parent directories. A missing
    /// file is an empty ledger; an unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::DataDir(e.to_string()))?;
        }

        let accounts = if path.exists() {
            let accounts = load_document(&path)?;
            info!(path = %path.display(), accounts = accounts.len(), "loaded account snapshot");
            accounts
        } else {
            info!(path = %path.display(), "no account snapshot, starting empty");
            AccountMap::new()
        };

        Ok(Self {
            path,
            accounts: RwLock::new(accounts),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// Write the current document to `destination`.
    pub fn export_to(&self, destination: &Path) -> Result<(), StoreError> {
        let bytes = render(&self.accounts.read())?;
        write_document(destination, &bytes)
    }

    /// Replace the whole map with the document at `source`. Returns the
    /// number of accounts now held.
    pub fn replace_from(&self, source: &Path) -> Result<usize, StoreError> {
        let _writer = self.writer.lock();
        let restored = load_document(source)?;
        write_document(&self.path, &render(&restored)?)?;
        let count = restored.len();
        *self.accounts.write() = restored;
        info!(from = %source.display(), accounts = count, "account snapshot restored");
        Ok(count)
    }

    /// Apply `change` to a copy of the map, persist it, then publish it.
    /// `change` returns `false` when there is nothing to write.
    fn mutate(
        &self,
        change: impl FnOnce(&mut AccountMap) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError> {
        let _writer = self.writer.lock();
        let mut next = self.accounts.read().clone();
        if !change(&mut next)? {
            return Ok(());
        }
        write_document(&self.path, &render(&next)?)?;
        *self.accounts.write() = next;
        Ok(())
    }
}

fn key_to_address(key: &[u8]) -> Result<Address, StoreError> {
    key.try_into().map_err(|_| StoreError::InvalidKey(key.len()))
}

fn parse_record(address: &Address, value: &[u8]) -> Result<AccountRecord, StoreError> {
    let record: AccountRecord =
        serde_json::from_slice(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    // Validate numeric and hash fields up front so the document never holds
    // a record that cannot be read back.
    record.to_account(&to_hex(address))?;
    Ok(record)
}

fn encode_record(record: &AccountRecord) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn render(accounts: &AccountMap) -> Result<Vec<u8>, StoreError> {
    let document: BTreeMap<String, &AccountRecord> = accounts
        .iter()
        .map(|(address, record)| (to_hex(address), record))
        .collect();
    serde_json::to_vec_pretty(&document).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parse a snapshot document. Entries with a malformed address or record
/// are skipped with a warning.
fn load_document(path: &Path) -> Result<AccountMap, StoreError> {
    let unreadable = |message: String| StoreError::Snapshot {
        path: path.to_path_buf(),
        message,
    };
    let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(AccountMap::new());
    }
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))?;

    let mut accounts = AccountMap::new();
    for (key, value) in raw {
        let Ok(address) = parse_address(&key) else {
            warn!(key = %key, "skipping malformed address in snapshot");
            continue;
        };
        let record = serde_json::from_value::<AccountRecord>(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))
            .and_then(|r| r.to_account(&key).map(|_| r));
        match record {
            Ok(record) => {
                accounts.insert(address, record);
            }
            Err(e) => warn!(address = %key, error = %e, "skipping malformed account record"),
        }
    }
    Ok(accounts)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Durable whole-document write. Only the failure of both the atomic
/// rename and the in-place fallback is an error.
pub fn write_document(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    let atomic = write_synced(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    let Err(primary) = atomic else {
        return Ok(());
    };

    warn!(path = %path.display(), error = %primary, "atomic write failed, writing in place");
    let _ = fs::remove_file(&tmp);
    write_synced(path, bytes).map_err(|fallback| {
        error!(path = %path.display(), error = %fallback, "document write failed");
        StoreError::Persistence {
            path: path.to_path_buf(),
            message: format!("rename: {primary}; direct write: {fallback}"),
        }
    })
}

impl KeyValueStore for SnapshotStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let address = key_to_address(key)?;
        self.accounts
            .read()
            .get(&address)
            .map(encode_record)
            .transpose()
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        let address = key_to_address(key)?;
        let record = parse_record(&address, &value)?;
        self.mutate(|accounts| {
            accounts.insert(address, record);
            Ok(true)
        })
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let address = key_to_address(key)?;
        self.mutate(|accounts| Ok(accounts.remove(&address).is_some()))
    }

    fn batch(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        if operations.is_empty() {
            return Ok(());
        }
        self.mutate(|accounts| {
            for op in operations {
                match op {
                    BatchOperation::Put { key, value } => {
                        let address = key_to_address(&key)?;
                        accounts.insert(address, parse_record(&address, &value)?);
                    }
                    BatchOperation::Delete { key } => {
                        accounts.remove(&key_to_address(&key)?);
                    }
                }
            }
            Ok(true)
        })
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.accounts
            .read()
            .iter()
            .filter(|(address, _)| address.starts_with(prefix))
            .map(|(address, record)| Ok((address.to_vec(), encode_record(record)?)))
            .collect()
    }
}
