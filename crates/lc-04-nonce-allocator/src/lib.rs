//! # lc-04-nonce-allocator
//!
//! Tracks, per sender, the committed nonce watermark (seeded from the
//! account store) and the nonces reserved by admitted but unsettled
//! transactions. Reservation is atomic per address.

pub mod allocator;
pub mod errors;
pub mod ports;

pub use allocator::NonceAllocator;
pub use errors::NonceError;
pub use ports::CommittedNonceSource;
