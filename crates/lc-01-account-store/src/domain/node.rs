use super::errors::TrieError;
use super::nibbles::Nibbles;
use rlp::{Rlp, RlpStream};
use shared_types::{keccak256, Hash};

/// Node types of the Patricia Merkle trie.
///
/// Children are always referenced by hash (no inlining of short nodes), so
/// every node on a path is a separate entry in the node store and a separate
/// element of a proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieNode {
    /// RLP: [hex_prefix(path, leaf), value]
    Leaf { path: Nibbles, value: Vec<u8> },

    /// RLP: [hex_prefix(path, extension), child_hash]
    Extension { path: Nibbles, child: Hash },

    /// RLP: [child_0, ..., child_15, value]
    Branch {
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    pub fn empty_branch() -> Self {
        TrieNode::Branch {
            children: Box::new([None; 16]),
            value: None,
        }
    }

    pub fn rlp_encode(&self) -> Vec<u8> {
        match self {
            TrieNode::Leaf { path, value } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&path.encode_hex_prefix(true));
                stream.append(value);
                stream.out().to_vec()
            }
            TrieNode::Extension { path, child } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&path.encode_hex_prefix(false));
                stream.append(&child.to_vec());
                stream.out().to_vec()
            }
            TrieNode::Branch { children, value } => {
                let mut stream = RlpStream::new_list(17);
                for child in children.iter() {
                    match child {
                        Some(hash) => stream.append(&hash.to_vec()),
                        None => stream.append_empty_data(),
                    };
                }
                match value {
                    Some(v) => stream.append(v),
                    None => stream.append_empty_data(),
                };
                stream.out().to_vec()
            }
        }
    }

    pub fn decode(encoded: &[u8]) -> Result<Self, TrieError> {
        let rlp = Rlp::new(encoded);
        if !rlp.is_list() {
            return Err(TrieError::CorruptNode("node is not a list".into()));
        }
        match rlp.item_count()? {
            2 => {
                let hp: Vec<u8> = rlp.val_at(0)?;
                let (path, is_leaf) = Nibbles::decode_hex_prefix(&hp)?;
                if is_leaf {
                    Ok(TrieNode::Leaf {
                        path,
                        value: rlp.val_at(1)?,
                    })
                } else {
                    Ok(TrieNode::Extension {
                        path,
                        child: hash_at(&rlp, 1)?.ok_or_else(|| {
                            TrieError::CorruptNode("extension without child".into())
                        })?,
                    })
                }
            }
            17 => {
                let mut children = Box::new([None; 16]);
                for (i, slot) in children.iter_mut().enumerate() {
                    *slot = hash_at(&rlp, i)?;
                }
                let value: Vec<u8> = rlp.val_at(16)?;
                Ok(TrieNode::Branch {
                    children,
                    value: (!value.is_empty()).then_some(value),
                })
            }
            n => Err(TrieError::CorruptNode(format!("unexpected item count {n}"))),
        }
    }

    pub fn hash(&self) -> Hash {
        keccak256(&self.rlp_encode())
    }
}

fn hash_at(rlp: &Rlp<'_>, index: usize) -> Result<Option<Hash>, TrieError> {
    let data = rlp.at(index)?.data()?;
    if data.is_empty() {
        return Ok(None);
    }
    let hash: Hash = data
        .try_into()
        .map_err(|_| TrieError::CorruptNode(format!("child reference of {} bytes", data.len())))?;
    Ok(Some(hash))
}
