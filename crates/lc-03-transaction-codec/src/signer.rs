//! EIP-155 signing hashes, sender recovery and signing.

use crate::codec::{append_unsigned, encode};
use crate::domain::{CodecError, DecodedTransaction, Result, UnsignedTransaction};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rlp::RlpStream;
use shared_types::{keccak256, Address, Hash};

/// Hash the sender signed, rebuilt from the fields exactly as received.
///
/// EIP-155: `keccak256(rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]))`.
/// Legacy (`v` ∈ {27, 28}): the first six fields only.
pub fn signing_hash(tx: &DecodedTransaction, chain_id: u64) -> Hash {
    let legacy = tx.is_legacy();
    let mut stream = RlpStream::new_list(if legacy { 6 } else { 9 });
    for raw in &tx.raw_fields {
        stream.append_raw(raw, 1);
    }
    if !legacy {
        append_replay_protection(&mut stream, chain_id);
    }
    keccak256(&stream.out())
}

/// Signing hash of a transaction about to be signed. `None` signs legacy.
pub fn unsigned_signing_hash(tx: &UnsignedTransaction, chain_id: Option<u64>) -> Hash {
    let mut stream = RlpStream::new_list(if chain_id.is_some() { 9 } else { 6 });
    append_unsigned(&mut stream, tx);
    if let Some(chain_id) = chain_id {
        append_replay_protection(&mut stream, chain_id);
    }
    keccak256(&stream.out())
}

fn append_replay_protection(stream: &mut RlpStream, chain_id: u64) {
    stream.append(&chain_id);
    stream.append_empty_data();
    stream.append_empty_data();
}

/// Recovery id encoded in `v`: `v - 27` for legacy signatures,
/// `v - (chainId * 2 + 35)` for EIP-155. Anything but 0 or 1 is rejected.
fn recovery_id(v: u64, chain_id: u64) -> Result<RecoveryId> {
    let offset = if v == 27 || v == 28 {
        Some(27)
    } else {
        chain_id.checked_mul(2).and_then(|c| c.checked_add(35))
    };
    let id = offset
        .and_then(|offset| v.checked_sub(offset))
        .filter(|id| *id <= 1)
        .ok_or_else(|| CodecError::SignatureRecovery(format!("invalid v {v} for chain {chain_id}")))?;
    RecoveryId::from_byte(id as u8)
        .ok_or_else(|| CodecError::SignatureRecovery(format!("invalid recovery id {id}")))
}

/// Recover the signing address. High-S and zero scalars are rejected;
/// there is no fallback when recovery fails.
pub fn recover_sender(hash: &Hash, v: u64, r: &[u8; 32], s: &[u8; 32], chain_id: u64) -> Result<Address> {
    let recovery_id = recovery_id(v, chain_id)?;

    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(r);
    bytes[32..].copy_from_slice(s);
    let signature = Signature::from_slice(&bytes)
        .map_err(|_| CodecError::SignatureRecovery("r or s out of range".into()))?;
    if signature.normalize_s().is_some() {
        return Err(CodecError::SignatureRecovery("high-s signature".into()));
    }

    let key = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
        .map_err(|_| CodecError::SignatureRecovery("no public key recoverable".into()))?;
    Ok(address_of(&key))
}

/// Last 20 bytes of keccak256 of the uncompressed public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Sign `tx` with EIP-155 replay protection and return the raw bytes.
pub fn sign(tx: &UnsignedTransaction, key: &SigningKey, chain_id: u64) -> Result<Vec<u8>> {
    let hash = unsigned_signing_hash(tx, Some(chain_id));
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&hash)
        .map_err(|e| CodecError::Signing(e.to_string()))?;

    let (signature, recovery_id) = match signature.normalize_s() {
        Some(low) => {
            let flipped = RecoveryId::from_byte(recovery_id.to_byte() ^ 1)
                .ok_or_else(|| CodecError::Signing("recovery id out of range".into()))?;
            (low, flipped)
        }
        None => (signature, recovery_id),
    };

    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);

    let v = chain_id
        .checked_mul(2)
        .and_then(|c| c.checked_add(35 + u64::from(recovery_id.to_byte())))
        .ok_or_else(|| CodecError::Signing(format!("chain id {chain_id} too large")))?;

    let signed = DecodedTransaction {
        unsigned: tx.clone(),
        v,
        r,
        s,
        raw_fields: Vec::new(),
        hash: [0u8; 32],
    };
    Ok(encode(&signed))
}

/// Address of a contract deployed by `sender` with `nonce`:
/// last 20 bytes of `keccak256(rlp([sender, nonce]))`.
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.to_vec());
    stream.append(&nonce);
    let digest = keccak256(&stream.out());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}
