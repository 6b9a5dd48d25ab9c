//! # lc-02-balance-cache
//!
//! Hot/warm/cold balance cache in front of the account store.
//!
//! - Reads check L1 → L2 → L3; an L2/L3 hit is promoted one tier hotter.
//! - Inserting into a full tier evicts its least recently used entry into
//!   the next colder tier. L3 evictions are dropped.
//! - Entries older than their tier's TTL read as absent and are purged by
//!   [`TieredBalanceCache::sweep`].
//!
//! The cache only answers reads. Every write to the account store must
//! invalidate the touched addresses.

pub mod domain;
pub mod service;

pub use domain::*;
pub use service::TieredBalanceCache;
