//! # Proof Trie
//!
//! Patricia Merkle trie whose nodes live in a [`KeyValueStore`] keyed by
//! node hash. Nodes are immutable once written: an update writes the new
//! path and swaps the root, so a failed update leaves the previous root
//! intact. Replaced nodes stay in the node table until [`ProofTrie::prune`].

use super::errors::{StoreError, TrieError};
use super::nibbles::{common_prefix_len, Nibbles};
use super::node::TrieNode;
use crate::adapters::MemoryKvStore;
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::Mutex;
use shared_types::{keccak256, to_hex, Hash, EMPTY_TRIE_ROOT};
use std::collections::HashSet;

enum Removal {
    NotFound,
    Replaced(Option<Hash>),
}

pub struct ProofTrie<S: KeyValueStore = MemoryKvStore> {
    nodes: S,
    /// Current root. Held for the whole of every structural update.
    root: Mutex<Hash>,
}

impl ProofTrie<MemoryKvStore> {
    pub fn in_memory() -> Self {
        Self::new(MemoryKvStore::new())
    }
}

impl<S: KeyValueStore> ProofTrie<S> {
    pub fn new(nodes: S) -> Self {
        Self {
            nodes,
            root: Mutex::new(EMPTY_TRIE_ROOT),
        }
    }

    pub fn root_hash(&self) -> Hash {
        *self.root.lock()
    }

    pub fn node_store(&self) -> &S {
        &self.nodes
    }

    /// Insert or replace `key`. An empty value removes the key.
    pub fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        let mut root = self.root.lock();
        self.insert_locked(&mut root, key, value)
    }

    /// Remove `key`; returns whether it was present.
    pub fn remove(&self, key: &[u8]) -> Result<bool, TrieError> {
        let mut root = self.root.lock();
        self.remove_locked(&mut root, key)
    }

    pub fn get_value(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        self.lookup(key, &mut Vec::new())
    }

    /// RLP-encoded nodes from the root towards `key`. For an absent key the
    /// nodes prove exclusion.
    pub fn prove(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, TrieError> {
        let mut proof = Vec::new();
        self.lookup(key, &mut proof)?;
        Ok(proof)
    }

    /// All key/value pairs, in nibble order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        let mut out = Vec::new();
        if let Some(root) = non_empty(self.root_hash()) {
            self.collect_leaves(root, &mut Vec::new(), &mut out)?;
        }
        Ok(out)
    }

    /// Drop every key and every stored node.
    pub fn clear(&self) -> Result<(), TrieError> {
        let mut root = self.root.lock();
        *root = EMPTY_TRIE_ROOT;
        let all: Vec<BatchOperation> = self
            .nodes
            .prefix_scan(&[])?
            .into_iter()
            .map(|(key, _)| BatchOperation::Delete { key })
            .collect();
        if !all.is_empty() {
            self.nodes.batch(all)?;
        }
        Ok(())
    }

    /// Delete nodes no longer reachable from the current root.
    pub fn prune(&self) -> Result<usize, TrieError> {
        let root = self.root.lock();
        let mut live = HashSet::new();
        if let Some(root) = non_empty(*root) {
            self.mark(root, &mut live)?;
        }
        let stale: Vec<BatchOperation> = self
            .nodes
            .prefix_scan(&[])?
            .into_iter()
            .filter(|(key, _)| !live.contains(key.as_slice()))
            .map(|(key, _)| BatchOperation::Delete { key })
            .collect();
        let count = stale.len();
        if count > 0 {
            self.nodes.batch(stale)?;
        }
        Ok(count)
    }

    fn insert_locked(&self, root: &mut Hash, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        if key.is_empty() {
            return Err(TrieError::InvalidKey(0));
        }
        if value.is_empty() {
            return self.remove_locked(root, key).map(|_| ());
        }
        let path = Nibbles::from_bytes(key);
        *root = self.insert_at(non_empty(*root), path.as_slice(), value)?;
        Ok(())
    }

    fn remove_locked(&self, root: &mut Hash, key: &[u8]) -> Result<bool, TrieError> {
        let Some(current) = non_empty(*root) else {
            return Ok(false);
        };
        let path = Nibbles::from_bytes(key);
        match self.remove_at(current, path.as_slice())? {
            Removal::NotFound => Ok(false),
            Removal::Replaced(new_root) => {
                *root = new_root.unwrap_or(EMPTY_TRIE_ROOT);
                Ok(true)
            }
        }
    }

    fn load(&self, hash: &Hash) -> Result<TrieNode, TrieError> {
        let encoded = self
            .nodes
            .get(hash)?
            .ok_or_else(|| TrieError::MissingNode(to_hex(hash)))?;
        TrieNode::decode(&encoded)
    }

    fn store(&self, node: TrieNode) -> Result<Hash, TrieError> {
        let encoded = node.rlp_encode();
        let hash = keccak256(&encoded);
        self.nodes.put(&hash, encoded)?;
        Ok(hash)
    }

    /// Extension over `child` unless the prefix is empty.
    fn wrap(&self, prefix: &[u8], child: Hash) -> Result<Hash, TrieError> {
        if prefix.is_empty() {
            return Ok(child);
        }
        self.store(TrieNode::Extension {
            path: Nibbles(prefix.to_vec()),
            child,
        })
    }

    /// Put `value` under a fresh branch at `rest`.
    fn place(
        &self,
        children: &mut [Option<Hash>; 16],
        branch_value: &mut Option<Vec<u8>>,
        rest: &[u8],
        value: Vec<u8>,
    ) -> Result<(), TrieError> {
        match rest.split_first() {
            None => *branch_value = Some(value),
            Some((&nibble, tail)) => {
                children[nibble as usize] = Some(self.store(TrieNode::Leaf {
                    path: Nibbles(tail.to_vec()),
                    value,
                })?);
            }
        }
        Ok(())
    }

    fn insert_at(&self, node: Option<Hash>, path: &[u8], value: Vec<u8>) -> Result<Hash, TrieError> {
        let Some(node) = node else {
            return self.store(TrieNode::Leaf {
                path: Nibbles(path.to_vec()),
                value,
            });
        };

        match self.load(&node)? {
            TrieNode::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path.as_slice() == path {
                    return self.store(TrieNode::Leaf {
                        path: leaf_path,
                        value,
                    });
                }
                let common = common_prefix_len(leaf_path.as_slice(), path);
                let mut children = Box::new([None; 16]);
                let mut branch_value = None;
                self.place(&mut children, &mut branch_value, &leaf_path.as_slice()[common..], leaf_value)?;
                self.place(&mut children, &mut branch_value, &path[common..], value)?;
                let branch = self.store(TrieNode::Branch {
                    children,
                    value: branch_value,
                })?;
                self.wrap(&path[..common], branch)
            }

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let common = common_prefix_len(ext_path.as_slice(), path);
                if common == ext_path.len() {
                    let new_child = self.insert_at(Some(child), &path[common..], value)?;
                    return self.store(TrieNode::Extension {
                        path: ext_path,
                        child: new_child,
                    });
                }
                let ext = ext_path.as_slice();
                let mut children = Box::new([None; 16]);
                let mut branch_value = None;
                children[ext[common] as usize] = Some(self.wrap(&ext[common + 1..], child)?);
                self.place(&mut children, &mut branch_value, &path[common..], value)?;
                let branch = self.store(TrieNode::Branch {
                    children,
                    value: branch_value,
                })?;
                self.wrap(&path[..common], branch)
            }

            TrieNode::Branch {
                mut children,
                value: mut branch_value,
            } => {
                match path.split_first() {
                    None => branch_value = Some(value),
                    Some((&nibble, tail)) => {
                        let slot = &mut children[nibble as usize];
                        *slot = Some(self.insert_at(*slot, tail, value)?);
                    }
                }
                self.store(TrieNode::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    fn remove_at(&self, node: Hash, path: &[u8]) -> Result<Removal, TrieError> {
        match self.load(&node)? {
            TrieNode::Leaf {
                path: leaf_path, ..
            } => Ok(if leaf_path.as_slice() == path {
                Removal::Replaced(None)
            } else {
                Removal::NotFound
            }),

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let Some(rest) = path.strip_prefix(ext_path.as_slice()) else {
                    return Ok(Removal::NotFound);
                };
                match self.remove_at(child, rest)? {
                    Removal::NotFound => Ok(Removal::NotFound),
                    Removal::Replaced(None) => Ok(Removal::Replaced(None)),
                    Removal::Replaced(Some(new_child)) => Ok(Removal::Replaced(Some(
                        self.join(ext_path.as_slice(), new_child)?,
                    ))),
                }
            }

            TrieNode::Branch {
                mut children,
                mut value,
            } => {
                match path.split_first() {
                    None => {
                        if value.take().is_none() {
                            return Ok(Removal::NotFound);
                        }
                    }
                    Some((&nibble, tail)) => {
                        let Some(child) = children[nibble as usize] else {
                            return Ok(Removal::NotFound);
                        };
                        match self.remove_at(child, tail)? {
                            Removal::NotFound => return Ok(Removal::NotFound),
                            Removal::Replaced(new_child) => children[nibble as usize] = new_child,
                        }
                    }
                }
                self.collapse(children, value).map(Removal::Replaced)
            }
        }
    }

    /// Re-normalize a branch that lost an entry.
    fn collapse(
        &self,
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    ) -> Result<Option<Hash>, TrieError> {
        let mut occupied = children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| (*c).map(|h| (i, h)));
        let first = occupied.next();
        let second = occupied.next();

        match (first, second, value) {
            (None, _, None) => Ok(None),
            (None, _, Some(value)) => self
                .store(TrieNode::Leaf {
                    path: Nibbles::default(),
                    value,
                })
                .map(Some),
            (Some((nibble, child)), None, None) => self.join(&[nibble as u8], child).map(Some),
            (_, _, value) => self.store(TrieNode::Branch { children, value }).map(Some),
        }
    }

    /// Prepend `prefix` to the node at `child`, merging paths where possible.
    fn join(&self, prefix: &[u8], child: Hash) -> Result<Hash, TrieError> {
        match self.load(&child)? {
            TrieNode::Leaf { path, value } => self.store(TrieNode::Leaf {
                path: Nibbles::join(prefix, path.as_slice()),
                value,
            }),
            TrieNode::Extension {
                path,
                child: grandchild,
            } => self.store(TrieNode::Extension {
                path: Nibbles::join(prefix, path.as_slice()),
                child: grandchild,
            }),
            TrieNode::Branch { .. } => self.wrap(prefix, child),
        }
    }

    fn lookup(&self, key: &[u8], proof: &mut Vec<Vec<u8>>) -> Result<Option<Vec<u8>>, TrieError> {
        let Some(mut current) = non_empty(self.root_hash()) else {
            return Ok(None);
        };
        let key_path = Nibbles::from_bytes(key);
        let mut rest = key_path.as_slice();

        loop {
            let encoded = self
                .nodes
                .get(&current)?
                .ok_or_else(|| TrieError::MissingNode(to_hex(&current)))?;
            let node = TrieNode::decode(&encoded)?;
            proof.push(encoded);

            match node {
                TrieNode::Leaf { path, value } => {
                    return Ok((path.as_slice() == rest).then_some(value));
                }
                TrieNode::Extension { path, child } => match rest.strip_prefix(path.as_slice()) {
                    Some(tail) => {
                        rest = tail;
                        current = child;
                    }
                    None => return Ok(None),
                },
                TrieNode::Branch { children, value } => match rest.split_first() {
                    None => return Ok(value),
                    Some((&nibble, tail)) => match children[nibble as usize] {
                        Some(child) => {
                            rest = tail;
                            current = child;
                        }
                        None => return Ok(None),
                    },
                },
            }
        }
    }

    fn collect_leaves(
        &self,
        node: Hash,
        prefix: &mut Vec<u8>,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), TrieError> {
        match self.load(&node)? {
            TrieNode::Leaf { path, value } => {
                let full = Nibbles::join(prefix, path.as_slice());
                out.push((nibbles_to_bytes(full.as_slice())?, value));
            }
            TrieNode::Extension { path, child } => {
                let len = prefix.len();
                prefix.extend_from_slice(path.as_slice());
                self.collect_leaves(child, prefix, out)?;
                prefix.truncate(len);
            }
            TrieNode::Branch { children, value } => {
                if let Some(value) = value {
                    out.push((nibbles_to_bytes(prefix)?, value));
                }
                for (nibble, child) in children.iter().enumerate() {
                    if let Some(child) = child {
                        prefix.push(nibble as u8);
                        self.collect_leaves(*child, prefix, out)?;
                        prefix.pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn mark(&self, node: Hash, live: &mut HashSet<Vec<u8>>) -> Result<(), TrieError> {
        if !live.insert(node.to_vec()) {
            return Ok(());
        }
        match self.load(&node)? {
            TrieNode::Leaf { .. } => {}
            TrieNode::Extension { child, .. } => self.mark(child, live)?,
            TrieNode::Branch { children, .. } => {
                for child in children.iter().flatten() {
                    self.mark(*child, live)?;
                }
            }
        }
        Ok(())
    }
}

/// Check `proof` against `root` and return the value it proves for `key`
/// (`None` proves absence). Any hash mismatch or structural problem is an
/// `InvalidProof` error.
pub fn verify_proof(root: &Hash, key: &[u8], proof: &[Vec<u8>]) -> Result<Option<Vec<u8>>, TrieError> {
    if *root == EMPTY_TRIE_ROOT {
        return if proof.is_empty() {
            Ok(None)
        } else {
            Err(TrieError::InvalidProof("nodes supplied for the empty trie".into()))
        };
    }

    let key_path = Nibbles::from_bytes(key);
    let mut rest = key_path.as_slice();
    let mut expected = *root;

    for (depth, encoded) in proof.iter().enumerate() {
        if keccak256(encoded) != expected {
            return Err(TrieError::InvalidProof(format!("hash mismatch at depth {depth}")));
        }
        let resolved = match TrieNode::decode(encoded)? {
            TrieNode::Leaf { path, value } => Some((path.as_slice() == rest).then_some(value)),
            TrieNode::Extension { path, child } => match rest.strip_prefix(path.as_slice()) {
                Some(tail) => {
                    rest = tail;
                    expected = child;
                    None
                }
                None => Some(None),
            },
            TrieNode::Branch { children, value } => match rest.split_first() {
                None => Some(value),
                Some((&nibble, tail)) => match children[nibble as usize] {
                    Some(child) => {
                        rest = tail;
                        expected = child;
                        None
                    }
                    None => Some(None),
                },
            },
        };
        if let Some(result) = resolved {
            if depth + 1 != proof.len() {
                return Err(TrieError::InvalidProof("trailing nodes".into()));
            }
            return Ok(result);
        }
    }
    Err(TrieError::InvalidProof("proof ends before the key resolves".into()))
}

fn non_empty(root: Hash) -> Option<Hash> {
    (root != EMPTY_TRIE_ROOT).then_some(root)
}

fn nibbles_to_bytes(nibbles: &[u8]) -> Result<Vec<u8>, TrieError> {
    if nibbles.len() % 2 != 0 {
        return Err(TrieError::CorruptNode("odd-length key path".into()));
    }
    Ok(nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect())
}

fn into_store_error(e: TrieError) -> StoreError {
    match e {
        TrieError::Storage(inner) => inner,
        other => StoreError::Trie(other.to_string()),
    }
}

impl<S: KeyValueStore> KeyValueStore for ProofTrie<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_value(key).map_err(into_store_error)
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.insert(key, value).map_err(into_store_error)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.remove(key).map(|_| ()).map_err(into_store_error)
    }

    /// Atomic: on failure the root is restored, which discards every
    /// operation already applied.
    fn batch(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut root = self.root.lock();
        let mut working = *root;
        for op in operations {
            let applied = match op {
                BatchOperation::Put { key, value } => self.insert_locked(&mut working, &key, value),
                BatchOperation::Delete { key } => self.remove_locked(&mut working, &key).map(|_| ()),
            };
            applied.map_err(into_store_error)?;
        }
        *root = working;
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .entries()
            .map_err(into_store_error)?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect())
    }
}
