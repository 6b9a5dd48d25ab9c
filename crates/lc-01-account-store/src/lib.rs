//! # lc-01-account-store
//!
//! Durable address → account map for the ledger.
//!
//! ## Role in System
//!
//! - **Single Source of Truth**: the canonical snapshot document is the only
//!   authority on balances and nonces.
//! - **Single Writer**: mutated by the settlement loop (and the contract
//!   engine collaborator); everybody else reads.
//! - **Proof Trie**: a secondary Patricia Merkle trie mirrors the canonical
//!   map for state roots and inclusion proofs. It is best effort: failures are
//!   reported as `TrieError`, logged, and never fail a write.
//!
//! ```text
//!  put / commit_batch
//!          │
//!          ▼
//!  ┌────────────────┐  temp + fsync + rename   ┌──────────────────┐
//!  │ SnapshotStore  │ ───────────────────────→ │  accounts.json   │
//!  └────────────────┘                          └──────────────────┘
//!          │ then (best effort)
//!          ▼
//!  ┌────────────────┐
//!  │   ProofTrie    │ ──→ state_root / create_proof
//!  └────────────────┘
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
pub use service::{AccountStore, BatchCommit};
