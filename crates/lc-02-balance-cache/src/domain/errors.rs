use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}
