use serde::{Deserialize, Serialize};
use shared_types::{encoding, Address};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Pending transactions accepted before admission fails `MempoolFull`.
    pub max_depth: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self { max_depth: 50_000 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub tick_interval_ms: u64,
    /// Transactions applied per tick, FIFO.
    pub batch_size: usize,
    /// Sealed blocks kept in memory.
    pub retained_blocks: usize,
    /// Credited with `gasPrice * gasLimit` of every settled transaction.
    /// Fees are burned when unset.
    #[serde(with = "encoding::opt_hex_array")]
    pub fee_recipient: Option<Address>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            batch_size: 1000,
            retained_blocks: 1024,
            fee_recipient: None,
        }
    }
}
