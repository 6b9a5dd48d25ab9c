//! RLP wire format: `[nonce, gasPrice, gasLimit, to, value, data, v, r, s]`.

use crate::domain::{CodecError, DecodedTransaction, Result, UnsignedTransaction};
use rlp::{Rlp, RlpStream};
use shared_types::{keccak256, U256};

/// Largest raw transaction accepted.
pub const MAX_TRANSACTION_SIZE: usize = 128 * 1024;

const FIELD_NAMES: [&str; 9] = ["nonce", "gasPrice", "gasLimit", "to", "value", "data", "v", "r", "s"];

/// Parse a signed transaction. Never panics on hostile input.
pub fn decode(raw: &[u8]) -> Result<DecodedTransaction> {
    if raw.len() > MAX_TRANSACTION_SIZE {
        return Err(CodecError::TooLarge {
            size: raw.len(),
            max: MAX_TRANSACTION_SIZE,
        });
    }
    if raw.is_empty() {
        return Err(CodecError::Malformed("empty input".into()));
    }

    let rlp = Rlp::new(raw);
    if !rlp.is_list() {
        return Err(CodecError::Malformed("not an RLP list".into()));
    }
    let info = rlp.payload_info()?;
    if info.header_len + info.value_len != raw.len() {
        return Err(CodecError::Malformed("trailing bytes after transaction".into()));
    }
    let count = rlp.item_count()?;
    if count != 9 {
        return Err(CodecError::Malformed(format!("expected 9 fields, got {count}")));
    }

    let mut items = Vec::with_capacity(9);
    for (index, name) in FIELD_NAMES.iter().enumerate() {
        let item = rlp.at(index)?;
        if item.is_list() {
            return Err(CodecError::Malformed(format!("{name} must be a byte string")));
        }
        items.push(item);
    }

    let to = match items[3].data()? {
        [] => None,
        bytes => Some(bytes.try_into().map_err(|_| {
            CodecError::Malformed(format!("to must be 0 or 20 bytes, got {}", bytes.len()))
        })?),
    };

    let unsigned = UnsignedTransaction {
        nonce: uint_u64(&items[0], "nonce")?,
        gas_price: uint_u256(&items[1], "gasPrice")?,
        gas_limit: uint_u64(&items[2], "gasLimit")?,
        to,
        value: uint_u256(&items[4], "value")?,
        data: items[5].data()?.to_vec(),
    };

    Ok(DecodedTransaction {
        unsigned,
        v: uint_u64(&items[6], "v")?,
        r: word(&items[7], "r")?,
        s: word(&items[8], "s")?,
        raw_fields: items[..6].iter().map(|item| item.as_raw().to_vec()).collect(),
        hash: keccak256(raw),
    })
}

/// Decode a hex string, with or without `0x`.
pub fn decode_hex(input: &str) -> Result<DecodedTransaction> {
    let raw = shared_types::decode_hex(input).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    decode(&raw)
}

/// Canonical RLP encoding of a signed transaction.
pub fn encode(tx: &DecodedTransaction) -> Vec<u8> {
    let mut stream = RlpStream::new_list(9);
    append_unsigned(&mut stream, &tx.unsigned);
    stream.append(&tx.v);
    stream.append(&trim_leading_zeros(&tx.r));
    stream.append(&trim_leading_zeros(&tx.s));
    stream.out().to_vec()
}

pub(crate) fn append_unsigned(stream: &mut RlpStream, tx: &UnsignedTransaction) {
    stream.append(&tx.nonce);
    stream.append(&u256_bytes(&tx.gas_price));
    stream.append(&tx.gas_limit);
    match &tx.to {
        Some(to) => stream.append(&to.to_vec()),
        None => stream.append_empty_data(),
    };
    stream.append(&u256_bytes(&tx.value));
    stream.append(&tx.data);
}

/// Minimal big-endian bytes of a U256 (empty for zero).
pub(crate) fn u256_bytes(value: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    trim_leading_zeros(&buf)
}

pub(crate) fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Integer payload: at most `max_len` bytes, no leading zero byte.
fn uint_bytes<'a>(item: &Rlp<'a>, name: &str, max_len: usize) -> Result<&'a [u8]> {
    let bytes = item.data()?;
    if bytes.len() > max_len {
        return Err(CodecError::Malformed(format!(
            "{name} exceeds {max_len} bytes"
        )));
    }
    if bytes.first() == Some(&0) {
        return Err(CodecError::Malformed(format!("{name} has leading zeros")));
    }
    Ok(bytes)
}

fn uint_u64(item: &Rlp<'_>, name: &str) -> Result<u64> {
    Ok(uint_bytes(item, name, 8)?
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn uint_u256(item: &Rlp<'_>, name: &str) -> Result<U256> {
    Ok(U256::from_big_endian(uint_bytes(item, name, 32)?))
}

/// Signature scalar, left-padded to 32 bytes.
fn word(item: &Rlp<'_>, name: &str) -> Result<[u8; 32]> {
    let bytes = item.data()?;
    if bytes.len() > 32 {
        return Err(CodecError::Malformed(format!("{name} exceeds 32 bytes")));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}
