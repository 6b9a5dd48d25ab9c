//! # lc-06-settlement
//!
//! Admission, the mempool and the settlement loop, behind the
//! [`LedgerService`] facade.
//!
//! ```text
//! raw tx ──→ decode + recover ──→ security gates ──→ nonce reserve
//!                                                        │
//!                               balance + outflow check ←┘
//!                                        │
//!                                        ▼
//!                                   ┌─────────┐  tick   ┌──────────────┐
//!                                   │ Mempool │ ──────→ │ Settlement   │ ──→ Block
//!                                   └─────────┘  FIFO   │ (sole writer)│
//!                                                       └──────────────┘
//! ```

pub mod adapters;
pub mod chain;
pub mod config;
pub mod errors;
pub mod journal;
pub mod mempool;
pub mod service;
pub mod settlement;

pub use adapters::StoreNonceSource;
pub use chain::{block_hash, Chain, ChainTip, CHAIN_TIP_FILE};
pub use config::{MempoolConfig, SettlementConfig};
pub use errors::{AdmissionError, MempoolError, SettlementError};
pub use journal::{PendingDocument, PendingJournal, PENDING_JOURNAL_FILE};
pub use mempool::Mempool;
pub use service::{LedgerParts, LedgerService};
pub use settlement::{DropReason, SettlementLoop, TickReport};
