use crate::domain::{CacheConfig, CacheEntry, CacheError, CacheStats, Tier};
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{to_hex, Address, TimeSource, Timestamp, U256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, trace};

struct Tiers {
    caches: [LruCache<Address, CacheEntry>; 3],
    stats: CacheStats,
    /// Bumped by every invalidation so in-flight loads can tell their value
    /// may be stale.
    generation: u64,
}

impl Tiers {
    fn lookup(&mut self, address: &Address, now: Timestamp, config: &CacheConfig) -> Option<U256> {
        for tier in Tier::ALL {
            let cache = &mut self.caches[tier.index()];
            let Some(entry) = cache.peek(address).copied() else {
                continue;
            };
            if entry.is_expired(now, config.ttl_ms(tier)) {
                cache.pop(address);
                self.stats.expirations += 1;
                // An address lives in at most one tier.
                break;
            }

            match tier.hotter() {
                None => {
                    cache.get(address);
                    self.stats.l1_hits += 1;
                }
                Some(target) => {
                    cache.pop(address);
                    if tier == Tier::L2 {
                        self.stats.l2_hits += 1;
                    } else {
                        self.stats.l3_hits += 1;
                    }
                    self.stats.promotions += 1;
                    self.insert(
                        target,
                        *address,
                        CacheEntry {
                            balance: entry.balance,
                            inserted_at: now,
                        },
                    );
                }
            }
            return Some(entry.balance);
        }
        self.stats.misses += 1;
        None
    }

    /// Insert, cascading LRU evictions into colder tiers.
    fn insert(&mut self, tier: Tier, address: Address, entry: CacheEntry) {
        let (mut tier, mut address, mut entry) = (tier, address, entry);
        loop {
            let Some((evicted_address, evicted)) = self.caches[tier.index()].push(address, entry) else {
                return;
            };
            if evicted_address == address {
                // Replaced in place, nothing left the tier.
                return;
            }
            self.stats.evictions += 1;
            let Some(colder) = tier.colder() else {
                trace!(address = %to_hex(&evicted_address), "dropped from L3");
                return;
            };
            self.stats.demotions += 1;
            tier = colder;
            address = evicted_address;
            entry = evicted;
        }
    }

    fn remove_everywhere(&mut self, address: &Address) -> bool {
        let mut removed = false;
        for cache in &mut self.caches {
            removed |= cache.pop(address).is_some();
        }
        removed
    }
}

/// Three-tier LRU + TTL balance cache. Internally synchronized.
pub struct TieredBalanceCache {
    config: CacheConfig,
    clock: Arc<dyn TimeSource>,
    inner: Mutex<Tiers>,
}

impl TieredBalanceCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn TimeSource>) -> Result<Self, CacheError> {
        config.validate()?;
        let tier_cache = |tier: Tier| {
            NonZeroUsize::new(config.capacity(tier))
                .map(LruCache::new)
                .ok_or_else(|| CacheError::InvalidConfig(format!("{tier:?} capacity must be non-zero")))
        };
        let caches = [tier_cache(Tier::L1)?, tier_cache(Tier::L2)?, tier_cache(Tier::L3)?];

        Ok(Self {
            config,
            clock,
            inner: Mutex::new(Tiers {
                caches,
                stats: CacheStats::default(),
                generation: 0,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached balance, promoting L2/L3 hits. `None` on miss or expiry.
    pub fn get_balance(&self, address: &Address) -> Option<U256> {
        let now = self.clock.now();
        self.inner.lock().lookup(address, now, &self.config)
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.set_balance_in(address, balance, Tier::L1);
    }

    /// Insert into a specific tier, replacing any copy in other tiers.
    pub fn set_balance_in(&self, address: Address, balance: U256, tier: Tier) {
        let inserted_at = self.clock.now();
        let mut inner = self.inner.lock();
        inner.remove_everywhere(&address);
        inner.insert(tier, address, CacheEntry { balance, inserted_at });
    }

    /// Read-through: on a miss, `load` reads the authoritative balance,
    /// which is cached in L1 unless an invalidation raced with the load.
    pub fn get_or_load<E>(
        &self,
        address: &Address,
        load: impl FnOnce(&Address) -> Result<U256, E>,
    ) -> Result<U256, E> {
        let generation = {
            let now = self.clock.now();
            let mut inner = self.inner.lock();
            if let Some(balance) = inner.lookup(address, now, &self.config) {
                return Ok(balance);
            }
            inner.generation
        };

        let balance = load(address)?;

        let inserted_at = self.clock.now();
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.remove_everywhere(address);
            inner.insert(Tier::L1, *address, CacheEntry { balance, inserted_at });
        } else {
            debug!(address = %to_hex(address), "skipping cache fill after concurrent invalidation");
        }
        Ok(balance)
    }

    pub fn invalidate(&self, address: &Address) {
        let mut inner = self.inner.lock();
        inner.remove_everywhere(address);
        inner.generation += 1;
    }

    pub fn invalidate_many<'a>(&self, addresses: impl IntoIterator<Item = &'a Address>) {
        let mut inner = self.inner.lock();
        for address in addresses {
            inner.remove_everywhere(address);
        }
        inner.generation += 1;
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for cache in &mut inner.caches {
            cache.clear();
        }
        inner.generation += 1;
    }

    /// Purge TTL-expired entries from every tier. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let mut purged = 0;
        for tier in Tier::ALL {
            let ttl = self.config.ttl_ms(tier);
            let cache = &mut inner.caches[tier.index()];
            let expired: Vec<Address> = cache
                .iter()
                .filter(|(_, entry)| entry.is_expired(now, ttl))
                .map(|(address, _)| *address)
                .collect();
            for address in &expired {
                cache.pop(address);
            }
            purged += expired.len();
        }
        inner.stats.expirations += purged as u64;
        if purged > 0 {
            debug!(purged, "cache sweep");
        }
        purged
    }

    /// Tier currently holding `address`, without touching recency.
    pub fn tier_of(&self, address: &Address) -> Option<Tier> {
        let inner = self.inner.lock();
        Tier::ALL
            .into_iter()
            .find(|tier| inner.caches[tier.index()].contains(address))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().caches.iter().map(LruCache::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            l1_len: inner.caches[0].len(),
            l2_len: inner.caches[1].len(),
            l3_len: inner.caches[2].len(),
            ..inner.stats.clone()
        }
    }
}
