//! Security alert records handed to the audit-log collaborator.

use crate::entities::Address;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of suspicious activity observed by the security monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// More admission attempts than allowed inside the rate window.
    RapidTransactions,
    /// Several transactions competing for the same (sender, nonce).
    DoubleSpending,
    /// Repeated attempts to spend more than the available balance.
    BalanceManipulation,
    /// Transfer whose recipient is the sender.
    SelfTransfer,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertType::RapidTransactions => "rapid_transactions",
            AlertType::DoubleSpending => "double_spending",
            AlertType::BalanceManipulation => "balance_manipulation",
            AlertType::SelfTransfer => "self_transfer",
        };
        f.write_str(name)
    }
}

/// Severity levels, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

/// `{timestamp, address, type, severity, details}` alert record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub timestamp: Timestamp,
    #[serde(with = "crate::encoding::hex_array")]
    pub address: Address,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_serializes_with_type_field() {
        let alert = SecurityAlert {
            timestamp: 7,
            address: [0x11; 20],
            alert_type: AlertType::DoubleSpending,
            severity: AlertSeverity::High,
            details: serde_json::json!({ "nonce": 3 }),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "double_spending");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["details"]["nonce"], 3);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }
}
