//! # Shared Types Crate
//!
//! Domain entities and helpers shared by every ledger subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `Account`, `Transaction` and `Block` are
//!   defined once here and consumed by store, codec, mempool and settlement.
//! - **Fixed-point balances**: all amounts are `U256` minor units with
//!   [`DECIMALS`] decimal places. No floating point anywhere.
//! - **Injectable time**: components read the clock through [`TimeSource`].

pub mod encoding;
pub mod entities;
pub mod errors;
pub mod security;
pub mod time;

pub use encoding::*;
pub use entities::*;
pub use errors::*;
pub use security::{AlertSeverity, AlertType, SecurityAlert};
pub use time::{MockTimeSource, SystemTimeSource, TimeSource, Timestamp};
