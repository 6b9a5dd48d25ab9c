use crate::errors::NonceError;
use crate::ports::CommittedNonceSource;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use shared_types::{to_hex, Address};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct NonceEntry {
    /// Last committed nonce + 1, i.e. the account nonce.
    committed_next: u64,
    reserved: BTreeSet<u64>,
}

impl NonceEntry {
    /// Pull in commits made directly against the store.
    fn refresh(&mut self, durable: u64) {
        if durable > self.committed_next {
            self.committed_next = durable;
            self.reserved = self.reserved.split_off(&durable);
        }
    }

    fn next_nonce(&self) -> u64 {
        self.reserved
            .last()
            .map_or(self.committed_next, |max| self.committed_next.max(max + 1))
    }
}

/// Nonce reservations, sharded per address.
pub struct NonceAllocator {
    entries: DashMap<Address, NonceEntry>,
    source: Arc<dyn CommittedNonceSource>,
}

impl NonceAllocator {
    pub fn new(source: Arc<dyn CommittedNonceSource>) -> Self {
        Self {
            entries: DashMap::new(),
            source,
        }
    }

    /// Entry for `address`, locked, reconciled with the durable nonce.
    fn entry(&self, address: &Address) -> RefMut<'_, Address, NonceEntry> {
        let durable = self.source.committed_nonce(address);
        let mut entry = self.entries.entry(*address).or_default();
        entry.refresh(durable);
        entry
    }

    /// Next nonce the sender should use: one past the highest committed or
    /// reserved nonce.
    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.entry(address).next_nonce()
    }

    /// Claim `(address, nonce)`. A nonce below the committed watermark or
    /// already reserved conflicts; one beyond the next nonce is a gap.
    /// Holes left by released reservations may be refilled.
    pub fn reserve(&self, address: &Address, nonce: u64) -> Result<(), NonceError> {
        let mut entry = self.entry(address);
        let next_nonce = entry.next_nonce();

        if nonce < entry.committed_next || entry.reserved.contains(&nonce) {
            return Err(NonceError::Conflict {
                address: to_hex(address),
                nonce,
                next_nonce,
            });
        }
        if nonce > next_nonce {
            return Err(NonceError::Gap {
                address: to_hex(address),
                nonce,
                expected: next_nonce,
            });
        }

        entry.reserved.insert(nonce);
        trace!(address = %to_hex(address), nonce, "nonce reserved");
        Ok(())
    }

    /// Free a reservation after a terminal failure or withdrawal.
    pub fn release(&self, address: &Address, nonce: u64) -> bool {
        let Some(mut entry) = self.entries.get_mut(address) else {
            return false;
        };
        let released = entry.reserved.remove(&nonce);
        if released {
            debug!(address = %to_hex(address), nonce, "nonce reservation released");
        }
        released
    }

    /// Record that `nonce` settled. The watermark never moves backwards.
    pub fn commit(&self, address: &Address, nonce: u64) {
        let mut entry = self.entry(address);
        let committed_next = nonce.saturating_add(1);
        if committed_next > entry.committed_next {
            entry.committed_next = committed_next;
        }
        let keep = entry.reserved.split_off(&committed_next);
        entry.reserved = keep;
        trace!(address = %to_hex(address), nonce, "nonce committed");
    }

    pub fn is_reserved(&self, address: &Address, nonce: u64) -> bool {
        self.entries
            .get(address)
            .is_some_and(|entry| entry.reserved.contains(&nonce))
    }

    pub fn reserved_count(&self, address: &Address) -> usize {
        self.entries.get(address).map_or(0, |entry| entry.reserved.len())
    }

    /// Forget addresses with no outstanding reservations; they reseed from
    /// the store on next use.
    pub fn prune_idle(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.reserved.is_empty());
        before - self.entries.len()
    }

    pub fn tracked_addresses(&self) -> usize {
        self.entries.len()
    }
}
