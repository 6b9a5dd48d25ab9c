//! # lc-03-transaction-codec
//!
//! Turns raw signed bytes into a sender-recovered [`Transaction`].
//!
//! ```text
//! raw ──decode──→ DecodedTransaction ──signing_hash──→ hash
//!                         │                              │
//!                         └────── v, r, s ──recover_sender┘──→ from
//! ```
//!
//! The signing hash is rebuilt from the exact RLP encodings of the first
//! six fields as they appeared on the wire, never from re-encoded values.
//! Recovery failure is always a rejection.
//!
//! [`Transaction`]: shared_types::Transaction

pub mod codec;
pub mod domain;
pub mod service;
pub mod signer;

pub use codec::{decode, decode_hex, encode, MAX_TRANSACTION_SIZE};
pub use domain::*;
pub use service::TransactionCodec;
pub use signer::{address_of, contract_address, recover_sender, sign, signing_hash, unsigned_signing_hash};
