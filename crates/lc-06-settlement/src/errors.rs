//! Error types for admission, the mempool and settlement.

use lc_01_account_store::StoreError;
use lc_03_transaction_codec::CodecError;
use lc_04_nonce_allocator::NonceError;
use lc_05_security_monitor::SecurityError;
use shared_types::{Timestamp, U256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("Transaction {0} is already pending")]
    Duplicate(String),

    #[error("Mempool full ({max_depth} pending)")]
    Full { max_depth: usize },

    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: U256, available: U256 },
}

/// Why a transaction was not admitted. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Signature recovery failed: {0}")]
    SignatureRecovery(String),

    #[error("Sender and recipient are the same address {address}")]
    SelfTransfer { address: String },

    #[error("Rate limited: retry in {retry_after_ms} ms")]
    RateLimited { address: String, retry_after_ms: u64 },

    #[error("Sender {address} blocked until {until_ms}: {reason}")]
    Blocked {
        address: String,
        until_ms: Timestamp,
        reason: String,
    },

    #[error("Duplicate transaction {0}")]
    DuplicateTransaction(String),

    #[error("Nonce {nonce} already used by {address}, next nonce is {next_nonce}")]
    NonceConflict {
        address: String,
        nonce: u64,
        next_nonce: u64,
    },

    #[error("Nonce {nonce} from {address} skips ahead of {expected}")]
    NonceGap {
        address: String,
        nonce: u64,
        expected: u64,
    },

    #[error("Insufficient balance for {address}: {required} required, {available} available")]
    InsufficientBalance {
        address: String,
        required: U256,
        available: U256,
    },

    #[error("Mempool full ({max_depth} pending)")]
    MempoolFull { max_depth: usize },

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Whether the client may succeed by trying again: later with the same
    /// bytes, or with the next free nonce after a `NonceConflict`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdmissionError::NonceConflict { .. }
                | AdmissionError::RateLimited { .. }
                | AdmissionError::Blocked { .. }
                | AdmissionError::MempoolFull { .. }
                | AdmissionError::Persistence(_)
        )
    }
}

impl From<CodecError> for AdmissionError {
    fn from(e: CodecError) -> Self {
        if e.is_decode_error() {
            AdmissionError::Decode(e.to_string())
        } else {
            AdmissionError::SignatureRecovery(e.to_string())
        }
    }
}

impl From<SecurityError> for AdmissionError {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::RateLimited {
                address,
                retry_after_ms,
            } => AdmissionError::RateLimited {
                address,
                retry_after_ms,
            },
            SecurityError::Blocked {
                address,
                until_ms,
                reason,
            } => AdmissionError::Blocked {
                address,
                until_ms,
                reason,
            },
            SecurityError::InvalidConfig(message) => AdmissionError::Internal(message),
        }
    }
}

impl From<NonceError> for AdmissionError {
    fn from(e: NonceError) -> Self {
        match e {
            NonceError::Conflict {
                address,
                nonce,
                next_nonce,
            } => AdmissionError::NonceConflict {
                address,
                nonce,
                next_nonce,
            },
            NonceError::Gap {
                address,
                nonce,
                expected,
            } => AdmissionError::NonceGap {
                address,
                nonce,
                expected,
            },
        }
    }
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        AdmissionError::Persistence(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    /// The batch write failed; the batch was requeued untouched.
    #[error("Settlement batch not persisted: {0}")]
    Persistence(#[from] StoreError),

    /// The block is sealed and its state committed; the tip write is
    /// retried before the next batch is drained.
    #[error("Chain tip {index} not persisted: {source}")]
    TipPersistence {
        index: u64,
        #[source]
        source: StoreError,
    },

    #[error("Chain tip unreadable at {path}: {message}")]
    ChainTip { path: String, message: String },

    #[error("Pending journal unreadable at {path}: {message}")]
    PendingJournal { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let conflict = AdmissionError::from(NonceError::Conflict {
            address: "0xa1".into(),
            nonce: 0,
            next_nonce: 1,
        });
        assert!(conflict.is_retryable());
        assert!(AdmissionError::MempoolFull { max_depth: 1 }.is_retryable());

        assert!(!AdmissionError::Decode("bad rlp".into()).is_retryable());
        assert!(!AdmissionError::SelfTransfer { address: "0xa1".into() }.is_retryable());
        assert!(!AdmissionError::DuplicateTransaction("0x01".into()).is_retryable());
    }
}
