use crate::codec;
use crate::domain::{DecodedTransaction, Result};
use crate::signer::{recover_sender, signing_hash};
use shared_types::{to_hex, Transaction, TxSignature, DEFAULT_CHAIN_ID};
use tracing::debug;

/// Decoder bound to one chain id.
#[derive(Clone, Copy, Debug)]
pub struct TransactionCodec {
    chain_id: u64,
}

impl Default for TransactionCodec {
    fn default() -> Self {
        Self::new(DEFAULT_CHAIN_ID)
    }
}

impl TransactionCodec {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Decode raw bytes and recover the sender.
    pub fn decode_and_recover(&self, raw: &[u8]) -> Result<Transaction> {
        let decoded = codec::decode(raw)?;
        self.recover(decoded)
    }

    pub fn decode_hex_and_recover(&self, input: &str) -> Result<Transaction> {
        let decoded = codec::decode_hex(input)?;
        self.recover(decoded)
    }

    pub fn recover(&self, decoded: DecodedTransaction) -> Result<Transaction> {
        let hash = signing_hash(&decoded, self.chain_id);
        let from = recover_sender(&hash, decoded.v, &decoded.r, &decoded.s, self.chain_id)?;
        debug!(tx_hash = %to_hex(&decoded.hash), from = %to_hex(&from), "sender recovered");

        let DecodedTransaction {
            unsigned, v, r, s, hash, ..
        } = decoded;
        Ok(Transaction {
            hash,
            from,
            to: unsigned.to,
            value: unsigned.value,
            gas_price: unsigned.gas_price,
            gas_limit: unsigned.gas_limit,
            nonce: unsigned.nonce,
            data: unsigned.data,
            signature: TxSignature { v, r, s },
        })
    }
}
