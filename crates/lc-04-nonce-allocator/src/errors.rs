use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonceError {
    /// Already committed or already reserved. Retry with `next_nonce`.
    #[error("Nonce conflict for {address}: nonce {nonce} is taken, next is {next_nonce}")]
    Conflict {
        address: String,
        nonce: u64,
        next_nonce: u64,
    },

    /// Would leave a hole before the sender's next nonce.
    #[error("Nonce gap for {address}: got {nonce}, expected at most {expected}")]
    Gap {
        address: String,
        nonce: u64,
        expected: u64,
    },
}
