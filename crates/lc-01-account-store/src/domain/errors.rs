use std::path::PathBuf;
use thiserror::Error;

/// Errors from the canonical account store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Temp-write + rename and the direct-write fallback both failed.
    #[error("Persistence failure writing {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    /// The snapshot document on disk could not be read or parsed.
    #[error("Unreadable snapshot {}: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },

    /// A record in the snapshot has an unparsable field.
    #[error("Invalid account record for {address}: {reason}")]
    InvalidRecord { address: String, reason: String },

    /// Keys of the account keyspace are 20-byte addresses.
    #[error("Invalid key length: expected 20 bytes, got {0}")]
    InvalidKey(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Data directory error: {0}")]
    DataDir(String),

    /// Surfaced when the proof trie is used through the key-value port.
    #[error("Trie error: {0}")]
    Trie(String),
}

/// Errors from the secondary proof trie. Never fatal to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    #[error("Trie node storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Missing trie node {0}")]
    MissingNode(String),

    #[error("Corrupt trie node: {0}")]
    CorruptNode(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Invalid trie key length: {0}")]
    InvalidKey(usize),
}

impl From<rlp::DecoderError> for TrieError {
    fn from(e: rlp::DecoderError) -> Self {
        TrieError::CorruptNode(format!("{e:?}"))
    }
}
