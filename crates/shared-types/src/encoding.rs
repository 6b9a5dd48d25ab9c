//! # Encoding Helpers
//!
//! Hashing, `0x`-prefixed hex and fixed-point decimal conversions used at the
//! boundaries (snapshot documents, RPC inputs, logs).

use crate::entities::{Address, Hash, DECIMALS};
use crate::errors::ParseError;
use primitive_types::U256;
use sha3::{Digest, Keccak256};

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex with a `0x` prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with or without a `0x` prefix.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, ParseError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| ParseError::InvalidHex(e.to_string()))
}

/// Decode hex into a fixed-size array.
pub fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], ParseError> {
    let bytes = decode_hex(input)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ParseError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        })
}

/// Parse a `0x` + 40 hex address.
pub fn parse_address(input: &str) -> Result<Address, ParseError> {
    decode_fixed::<20>(input)
}

/// Parse a `0x` + 64 hex hash.
pub fn parse_hash(input: &str) -> Result<Hash, ParseError> {
    decode_fixed::<32>(input)
}

fn unit() -> U256 {
    U256::exp10(DECIMALS as usize)
}

/// Parse a human decimal amount (`"8.99958"`) into minor units.
///
/// At most [`DECIMALS`] fractional digits are accepted; nothing is rounded.
pub fn parse_units(input: &str) -> Result<U256, ParseError> {
    let input = input.trim();
    let invalid = || ParseError::InvalidDecimal(input.to_string());

    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
        || fraction.len() > DECIMALS as usize
    {
        return Err(invalid());
    }

    let whole = U256::from_dec_str(whole).map_err(|_| ParseError::Overflow)?;
    let fraction = if fraction.is_empty() {
        U256::zero()
    } else {
        let scale = U256::exp10(DECIMALS as usize - fraction.len());
        U256::from_dec_str(fraction).map_err(|_| invalid())? * scale
    };

    whole
        .checked_mul(unit())
        .and_then(|w| w.checked_add(fraction))
        .ok_or(ParseError::Overflow)
}

/// Render minor units as a trimmed decimal amount (`"8.99958"`).
pub fn format_units(amount: U256) -> String {
    let whole = amount / unit();
    let fraction = amount % unit();
    if fraction.is_zero() {
        return whole.to_string();
    }
    let padded = format!("{:0>width$}", fraction.to_string(), width = DECIMALS as usize);
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

/// Serde adapter for fixed byte arrays as `0x` hex strings.
pub mod hex_array {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_fixed::<N>(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter for optional byte arrays (`null` or `0x` hex).
pub mod opt_hex_array {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &Option<[u8; N]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&super::to_hex(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<Option<[u8; N]>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::decode_fixed::<N>(&s).map_err(D::Error::custom))
            .transpose()
    }
}

/// Serde adapter for variable-length bytes as `0x` hex.
pub mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(D::Error::custom)
    }
}
