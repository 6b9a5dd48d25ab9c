use super::errors::{StoreError, TrieError};
use rlp::{Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use shared_types::{decode_fixed, to_hex, Account, Address, ContractExtension, Hash, U256};

/// An account as it appears in the snapshot document.
///
/// Integers are decimal strings so the document never loses precision in
/// JSON tooling. Contract metadata is carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub nonce: String,
    pub balance: String,
    pub storage_root: String,
    pub code_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_contract: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_state: Option<serde_json::Value>,
}

impl From<&Account> for AccountRecord {
    fn from(account: &Account) -> Self {
        let contract = account.contract.as_ref();
        Self {
            nonce: account.nonce.to_string(),
            balance: account.balance.to_string(),
            storage_root: to_hex(&account.storage_root),
            code_hash: to_hex(&account.code_hash),
            is_contract: contract.map(|c| c.is_contract),
            contract_type: contract.and_then(|c| c.contract_type.clone()),
            contract_state: contract
                .map(|c| c.contract_state.clone())
                .filter(|state| !state.is_null()),
        }
    }
}

impl AccountRecord {
    /// Parse back into an [`Account`]. `address` only labels errors.
    pub fn to_account(&self, address: &str) -> Result<Account, StoreError> {
        let invalid = |field: &str, detail: String| StoreError::InvalidRecord {
            address: address.to_string(),
            reason: format!("{field}: {detail}"),
        };

        let nonce = self
            .nonce
            .parse::<u64>()
            .map_err(|e| invalid("nonce", e.to_string()))?;
        let balance =
            U256::from_dec_str(&self.balance).map_err(|e| invalid("balance", format!("{e:?}")))?;
        let storage_root = decode_fixed::<32>(&self.storage_root)
            .map_err(|e| invalid("storageRoot", e.to_string()))?;
        let code_hash =
            decode_fixed::<32>(&self.code_hash).map_err(|e| invalid("codeHash", e.to_string()))?;

        let contract = if self.is_contract.is_some()
            || self.contract_type.is_some()
            || self.contract_state.is_some()
        {
            Some(ContractExtension {
                is_contract: self.is_contract.unwrap_or(false),
                contract_type: self.contract_type.clone(),
                contract_state: self.contract_state.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(Account {
            nonce,
            balance,
            storage_root,
            code_hash,
            contract,
        })
    }
}

/// Trie value for an account: RLP `[nonce, balance, storageRoot, codeHash]`.
/// Contract metadata is not part of the committed state.
pub fn encode_account_rlp(account: &Account) -> Vec<u8> {
    let mut stream = RlpStream::new_list(4);
    stream.append(&account.nonce);
    stream.append(&u256_to_be_trimmed(&account.balance));
    stream.append(&account.storage_root.to_vec());
    stream.append(&account.code_hash.to_vec());
    stream.out().to_vec()
}

pub fn decode_account_rlp(encoded: &[u8]) -> Result<Account, TrieError> {
    let rlp = Rlp::new(encoded);
    if !rlp.is_list() || rlp.item_count()? != 4 {
        return Err(TrieError::CorruptNode("account value is not a 4-item list".into()));
    }
    let nonce: u64 = rlp.val_at(0)?;
    let balance_bytes = rlp.at(1)?.data()?;
    if balance_bytes.len() > 32 {
        return Err(TrieError::CorruptNode("balance wider than 256 bits".into()));
    }
    let balance = U256::from_big_endian(balance_bytes);
    let storage_root = fixed_32(rlp.at(2)?.data()?)?;
    let code_hash = fixed_32(rlp.at(3)?.data()?)?;
    Ok(Account {
        nonce,
        balance,
        storage_root,
        code_hash,
        contract: None,
    })
}

fn fixed_32(bytes: &[u8]) -> Result<Hash, TrieError> {
    bytes
        .try_into()
        .map_err(|_| TrieError::CorruptNode(format!("expected 32-byte hash, got {}", bytes.len())))
}

fn u256_to_be_trimmed(value: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let start = buf.iter().position(|b| *b != 0).unwrap_or(32);
    buf[start..].to_vec()
}

/// Inclusion (or exclusion) proof for one address against `state_root`.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountProof {
    pub address: Address,
    /// The account the proof commits to, `None` for an exclusion proof.
    pub account: Option<Account>,
    /// RLP-encoded trie nodes from the root towards the address.
    pub proof_nodes: Vec<Vec<u8>>,
    pub state_root: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    pub total_accounts: usize,
    pub total_balance: U256,
    /// `None` when the proof trie could not be built.
    pub state_root: Option<Hash>,
}

/// State root recorded after a block was sealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateRootEntry {
    pub block_index: u64,
    pub state_root: Hash,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{EMPTY_CODE_HASH, EMPTY_TRIE_ROOT};

    #[test]
    fn test_record_uses_decimal_strings_and_hex() {
        let account = Account::with_balance(U256::from(10u64).pow(U256::from(19u64))).with_nonce(7);
        let record = AccountRecord::from(&account);
        assert_eq!(record.nonce, "7");
        assert_eq!(record.balance, "10000000000000000000");
        assert_eq!(record.storage_root, to_hex(&EMPTY_TRIE_ROOT));
        assert_eq!(record.code_hash, to_hex(&EMPTY_CODE_HASH));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("isContract").is_none());
        assert_eq!(record.to_account("a").unwrap(), account);
    }

    #[test]
    fn test_record_preserves_contract_metadata() {
        let mut account = Account::default();
        account.contract = Some(ContractExtension {
            is_contract: true,
            contract_type: Some("ERC20".into()),
            contract_state: serde_json::json!({"symbol": "TKN", "supply": "1000"}),
        });
        let json = serde_json::to_string(&AccountRecord::from(&account)).unwrap();
        assert!(json.contains("\"isContract\":true"));
        let back: AccountRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_account("a").unwrap(), account);
    }

    #[test]
    fn test_malformed_record_rejected() {
        let mut record = AccountRecord::from(&Account::default());
        record.balance = "1.5".into();
        assert!(matches!(
            record.to_account("0xabc"),
            Err(StoreError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_account_rlp_roundtrip_drops_contract_metadata() {
        let mut account = Account::with_balance(U256::from(123_456_789u64)).with_nonce(3);
        let encoded = encode_account_rlp(&account);
        assert_eq!(decode_account_rlp(&encoded).unwrap(), account);

        account.contract = Some(ContractExtension::default());
        assert_eq!(encode_account_rlp(&account), encoded);
    }

    #[test]
    fn test_zero_balance_encodes_as_empty_string() {
        let encoded = encode_account_rlp(&Account::default());
        let rlp = Rlp::new(&encoded);
        assert!(rlp.at(1).unwrap().data().unwrap().is_empty());
    }
}
