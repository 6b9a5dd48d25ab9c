//! # Core Domain Entities
//!
//! - **Accounts**: `Account`, `ContractExtension`
//! - **Chain**: `Transaction`, `TxSignature`, `Block`

use serde::{Deserialize, Serialize};

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Decimal places of the native coin. Balances are integers in minor units.
pub const DECIMALS: u32 = 18;

/// Default chain id embedded in EIP-155 signatures.
pub const DEFAULT_CHAIN_ID: u64 = 22888;

/// The all-zero hash, used as the parent of the first block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// keccak256(RLP("")): root of an empty trie, the storage root of every EOA.
pub const EMPTY_TRIE_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

/// keccak256(""): code hash of accounts without code.
pub const EMPTY_CODE_HASH: Hash = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
];

/// Metadata attached by the contract engine. Stored and returned verbatim,
/// never interpreted by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractExtension {
    pub is_contract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub contract_state: serde_json::Value,
}

/// Ledger entry for one address.
///
/// - `nonce`: number of settled transactions sent from this address; the
///   next acceptable transaction nonce. Never decreases.
/// - `balance`: minor units, unsigned so it can never go negative.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: Hash,
    pub code_hash: Hash,
    pub contract: Option<ContractExtension>,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            storage_root: EMPTY_TRIE_ROOT,
            code_hash: EMPTY_CODE_HASH,
            contract: None,
        }
    }
}

impl Account {
    /// Create an EOA with the given balance.
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    /// Builder method to set nonce.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// An account indistinguishable from one that was never written.
    pub fn is_empty(&self) -> bool {
        self == &Account::default()
    }
}

/// ECDSA signature components as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub v: u64,
    #[serde(with = "crate::encoding::hex_array")]
    pub r: [u8; 32],
    #[serde(with = "crate::encoding::hex_array")]
    pub s: [u8; 32],
}

/// A decoded, sender-recovered transaction.
///
/// `hash` is keccak256 of the raw signed bytes and uniquely identifies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(with = "crate::encoding::hex_array")]
    pub hash: Hash,
    #[serde(with = "crate::encoding::hex_array")]
    pub from: Address,
    /// `None` for contract deployments.
    #[serde(with = "crate::encoding::opt_hex_array")]
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub nonce: u64,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub data: Vec<u8>,
    pub signature: TxSignature,
}

impl Transaction {
    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }

    /// gasPrice * gasLimit, or `None` on overflow.
    pub fn max_fee(&self) -> Option<U256> {
        self.gas_price.checked_mul(U256::from(self.gas_limit))
    }

    /// value + gasPrice * gasLimit, or `None` on overflow.
    pub fn total_cost(&self) -> Option<U256> {
        self.max_fee()?.checked_add(self.value)
    }
}

/// A sealed block. `hash` is a content hash over the other fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(with = "crate::encoding::hex_array")]
    pub previous_hash: Hash,
    #[serde(with = "crate::encoding::hex_array")]
    pub hash: Hash,
    pub transactions: Vec<Transaction>,
}
