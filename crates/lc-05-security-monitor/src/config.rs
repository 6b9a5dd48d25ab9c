use crate::errors::SecurityError;
use serde::{Deserialize, Serialize};

/// Thresholds and horizons of the security monitor, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub rate_window_ms: u64,
    /// Prior attempts inside the window that make the next one fail.
    pub rate_threshold: usize,
    /// Window count at which a rate alert becomes HIGH.
    pub rate_high_magnitude: usize,
    /// Attempts on one `(sender, nonce)` that trigger a block.
    pub replay_block_attempts: usize,
    pub balance_window_ms: u64,
    pub balance_threshold: usize,
    pub balance_high_magnitude: usize,
    pub block_duration_ms: u64,
    pub retention_ms: u64,
    pub cleanup_interval_ms: u64,
    /// Size of the recent-alert ring.
    pub alert_capacity: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_window_ms: 10_000,
            rate_threshold: 5,
            rate_high_magnitude: 10,
            replay_block_attempts: 3,
            balance_window_ms: 60_000,
            balance_threshold: 10,
            balance_high_magnitude: 5,
            block_duration_ms: 3_600_000,
            retention_ms: 24 * 60 * 60 * 1000,
            cleanup_interval_ms: 10 * 60 * 1000,
            alert_capacity: 1024,
        }
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), SecurityError> {
        let checks = [
            (self.rate_window_ms == 0, "rate_window_ms"),
            (self.rate_threshold == 0, "rate_threshold"),
            (self.replay_block_attempts < 2, "replay_block_attempts"),
            (self.balance_window_ms == 0, "balance_window_ms"),
            (self.balance_threshold == 0, "balance_threshold"),
            (self.block_duration_ms == 0, "block_duration_ms"),
            (self.cleanup_interval_ms == 0, "cleanup_interval_ms"),
            (self.alert_capacity == 0, "alert_capacity"),
        ];
        if let Some((_, field)) = checks.iter().find(|(bad, _)| *bad) {
            return Err(SecurityError::InvalidConfig(format!("{field} is out of range")));
        }
        if self.retention_ms < self.rate_window_ms.max(self.balance_window_ms) {
            return Err(SecurityError::InvalidConfig(
                "retention_ms must cover the detection windows".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(SecurityConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_threshold_and_short_retention() {
        let config = SecurityConfig {
            rate_threshold: 0,
            ..SecurityConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SecurityConfig {
            retention_ms: 1_000,
            ..SecurityConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
