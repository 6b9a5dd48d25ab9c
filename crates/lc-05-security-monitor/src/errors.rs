use shared_types::Timestamp;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Rate limit exceeded for {address}, retry in {retry_after_ms} ms")]
    RateLimited { address: String, retry_after_ms: u64 },

    #[error("Address {address} is blocked until {until_ms}: {reason}")]
    Blocked {
        address: String,
        until_ms: Timestamp,
        reason: String,
    },

    #[error("Invalid security configuration: {0}")]
    InvalidConfig(String),
}
