//! # Ledger-Chain Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Wallets, signed transactions, ledger harness
//! └── integration/
//!     ├── scenarios.rs  # Admission and settlement end to end
//!     ├── durability.rs # Restarts over a real data directory
//!     └── properties.rs # Ledger-wide invariants
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p lc-tests
//! cargo test -p lc-tests integration::scenarios::
//! cargo bench -p lc-tests
//! ```

pub mod fixtures;
pub mod integration;
