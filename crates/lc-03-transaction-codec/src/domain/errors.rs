use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not a well-formed 9-field transaction list.
    #[error("Malformed transaction: {0}")]
    Malformed(String),

    #[error("Transaction too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid hex input: {0}")]
    InvalidHex(String),

    /// Recovery id out of range or no public key recoverable.
    #[error("Signature recovery failed: {0}")]
    SignatureRecovery(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl CodecError {
    /// Errors a client caused by sending bad bytes.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CodecError::Malformed(_) | CodecError::TooLarge { .. } | CodecError::InvalidHex(_)
        )
    }
}

impl From<rlp::DecoderError> for CodecError {
    fn from(e: rlp::DecoderError) -> Self {
        CodecError::Malformed(format!("{e:?}"))
    }
}
