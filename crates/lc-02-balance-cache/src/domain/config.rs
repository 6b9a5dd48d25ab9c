use super::errors::CacheError;
use super::entities::Tier;
use serde::{Deserialize, Serialize};

/// Per-tier capacities and TTLs. Capacities and TTLs must both strictly
/// increase from L1 to L3.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1_capacity: usize,
    pub l2_capacity: usize,
    pub l3_capacity: usize,
    pub l1_ttl_ms: u64,
    pub l2_ttl_ms: u64,
    pub l3_ttl_ms: u64,
    /// Interval of the background TTL sweep.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            l2_capacity: 50_000,
            l3_capacity: 100_000,
            l1_ttl_ms: 60_000,
            l2_ttl_ms: 300_000,
            l3_ttl_ms: 900_000,
            sweep_interval_ms: 60_000,
        }
    }
}

impl CacheConfig {
    pub fn capacity(&self, tier: Tier) -> usize {
        match tier {
            Tier::L1 => self.l1_capacity,
            Tier::L2 => self.l2_capacity,
            Tier::L3 => self.l3_capacity,
        }
    }

    pub fn ttl_ms(&self, tier: Tier) -> u64 {
        match tier {
            Tier::L1 => self.l1_ttl_ms,
            Tier::L2 => self.l2_ttl_ms,
            Tier::L3 => self.l3_ttl_ms,
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.l1_capacity == 0 {
            return Err(CacheError::InvalidConfig("l1_capacity must be non-zero".into()));
        }
        if !(self.l1_capacity < self.l2_capacity && self.l2_capacity < self.l3_capacity) {
            return Err(CacheError::InvalidConfig(format!(
                "capacities must increase: {} < {} < {}",
                self.l1_capacity, self.l2_capacity, self.l3_capacity
            )));
        }
        if self.l1_ttl_ms == 0 || !(self.l1_ttl_ms < self.l2_ttl_ms && self.l2_ttl_ms < self.l3_ttl_ms) {
            return Err(CacheError::InvalidConfig(format!(
                "TTLs must be non-zero and increase: {} < {} < {}",
                self.l1_ttl_ms, self.l2_ttl_ms, self.l3_ttl_ms
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CacheError::InvalidConfig("sweep_interval_ms must be non-zero".into()));
        }
        Ok(())
    }
}
