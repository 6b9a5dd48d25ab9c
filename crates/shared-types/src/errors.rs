//! # Error Types
//!
//! Parsing errors for the textual forms of addresses, hashes and amounts.

use thiserror::Error;

/// Errors raised while parsing hex or decimal representations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input is not valid hexadecimal.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded byte length does not match the target type.
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Input is not a valid unsigned decimal amount.
    #[error("Invalid decimal amount: {0}")]
    InvalidDecimal(String),

    /// Amount does not fit into 256 bits.
    #[error("Amount overflows 256 bits")]
    Overflow,
}
