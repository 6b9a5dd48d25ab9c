use shared_types::{Address, Hash, U256};

/// Transaction fields covered by the signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` deploys a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

/// A parsed signed transaction, sender not yet recovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub unsigned: UnsignedTransaction,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Wire encodings of fields 0..=5 (nonce through data), as received.
    pub raw_fields: Vec<Vec<u8>>,
    /// keccak256 of the full raw transaction.
    pub hash: Hash,
}

impl DecodedTransaction {
    /// Pre-EIP-155 signature (`v` is 27 or 28).
    pub fn is_legacy(&self) -> bool {
        self.v == 27 || self.v == 28
    }
}
