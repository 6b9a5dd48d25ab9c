pub mod config;
pub mod entities;
pub mod errors;

pub use config::CacheConfig;
pub use entities::{CacheEntry, CacheStats, Tier};
pub use errors::CacheError;
