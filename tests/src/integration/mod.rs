//! Cross-crate integration tests.

pub mod durability;
pub mod properties;
pub mod scenarios;
