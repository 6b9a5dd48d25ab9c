//! # lc-05-security-monitor
//!
//! Fail-closed admission gates run before any ledger mutation:
//!
//! - sliding-window rate limiting per sender
//! - replay detection per `(sender, nonce)`
//! - repeated insufficient-balance detection
//! - a self-expiring blocklist fed by HIGH severity alerts
//!
//! Alerts are kept in a bounded ring, logged, and published on the event bus
//! for the audit collaborator.

pub mod config;
pub mod errors;
pub mod monitor;

pub use config::SecurityConfig;
pub use errors::SecurityError;
pub use monitor::{severity_for, BlockEntry, SecurityMonitor, SecurityStats};
