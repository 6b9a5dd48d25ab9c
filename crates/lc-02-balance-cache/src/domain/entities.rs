use serde::Serialize;
use shared_types::{Timestamp, U256};

/// Cache tier, hottest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
    L1,
    L2,
    L3,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::L1, Tier::L2, Tier::L3];

    pub fn index(self) -> usize {
        match self {
            Tier::L1 => 0,
            Tier::L2 => 1,
            Tier::L3 => 2,
        }
    }

    pub fn hotter(self) -> Option<Tier> {
        match self {
            Tier::L1 => None,
            Tier::L2 => Some(Tier::L1),
            Tier::L3 => Some(Tier::L2),
        }
    }

    pub fn colder(self) -> Option<Tier> {
        match self {
            Tier::L1 => Some(Tier::L2),
            Tier::L2 => Some(Tier::L3),
            Tier::L3 => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub balance: U256,
    /// When the entry entered its current tier (promotion resets it).
    pub inserted_at: Timestamp,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Timestamp, ttl_ms: u64) -> bool {
        now.saturating_sub(self.inserted_at) >= ttl_ms
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    /// LRU evictions from any tier.
    pub evictions: u64,
    /// Evictions that moved an entry one tier colder.
    pub demotions: u64,
    pub promotions: u64,
    pub expirations: u64,
    pub l1_len: usize,
    pub l2_len: usize,
    pub l3_len: usize,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.l1_hits + self.l2_hits + self.l3_hits
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}
