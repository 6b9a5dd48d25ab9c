//! # Node Runtime
//!
//! Owns the ledger container and the background tasks driving it.
//!
//! Shutdown order matters: maintenance tasks stop first, then the settlement
//! task, and finally the mempool is drained with direct ticks so that every
//! admitted transaction is either settled or dropped before the process
//! exits.

use crate::container::LedgerContainer;
use crate::tasks::{PeriodicTask, TaskHandle};
use anyhow::{Context, Result};
use lc_06_settlement::LedgerService;
use shared_bus::InMemoryEventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct NodeRuntime {
    container: LedgerContainer,
    settlement: Option<TaskHandle>,
    maintenance: Vec<TaskHandle>,
    trie_rebuild: Option<JoinHandle<()>>,
}

impl NodeRuntime {
    pub fn new(container: LedgerContainer) -> Self {
        Self {
            container,
            settlement: None,
            maintenance: Vec::new(),
            trie_rebuild: None,
        }
    }

    pub fn ledger(&self) -> &Arc<LedgerService> {
        &self.container.ledger
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.container.bus
    }

    /// Spawn the background tasks. Must run inside a tokio runtime.
    pub fn start(&mut self) {
        let config = &self.container.config;
        let ledger = self.container.ledger.clone();

        let store = ledger.store().clone();
        self.trie_rebuild = Some(tokio::task::spawn_blocking(move || match store.rebuild_proof_trie() {
            Ok(accounts) => info!(accounts, "proof trie rebuilt"),
            Err(e) => warn!(error = %e, "proof trie rebuild failed, will retry on first proof"),
        }));

        let settler = ledger.clone();
        self.settlement = Some(PeriodicTask::start(
            "settlement",
            Duration::from_millis(config.settlement.tick_interval_ms),
            move || settle_once(settler.clone()),
        ));

        let sweeper = ledger.clone();
        self.maintenance.push(PeriodicTask::start(
            "cache-sweep",
            Duration::from_millis(config.cache.sweep_interval_ms),
            move || {
                let ledger = sweeper.clone();
                async move {
                    let expired = ledger.cache().sweep();
                    let idle = ledger.nonces().prune_idle();
                    debug!(expired, idle_nonce_entries = idle, "cache sweep");
                }
            },
        ));

        let monitor = ledger.security().clone();
        self.maintenance.push(PeriodicTask::start(
            "security-cleanup",
            Duration::from_millis(config.security.cleanup_interval_ms),
            move || {
                let monitor = monitor.clone();
                async move {
                    let removed = monitor.cleanup();
                    debug!(removed, "security state cleaned");
                }
            },
        ));

        let store = ledger.store().clone();
        self.maintenance.push(PeriodicTask::start(
            "trie-prune",
            Duration::from_millis(config.storage.trie_prune_interval_ms),
            move || {
                let store = store.clone();
                async move {
                    match tokio::task::spawn_blocking(move || store.prune_proof_trie()).await {
                        Ok(Ok(removed)) => debug!(removed, "proof trie pruned"),
                        Ok(Err(e)) => warn!(error = %e, "proof trie prune failed"),
                        Err(e) => error!(error = %e, "proof trie prune panicked"),
                    }
                }
            },
        ));

        info!(
            tick_ms = config.settlement.tick_interval_ms,
            tasks = self.maintenance.len() + 1,
            "background tasks started"
        );
    }

    /// Stop every task, then settle whatever is still pending.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down");
        for task in self.maintenance.drain(..) {
            debug!(task = task.name(), "stopping");
            task.stop().await;
        }
        if let Some(rebuild) = self.trie_rebuild.take() {
            if let Err(e) = rebuild.await {
                warn!(error = %e, "proof trie rebuild ended abnormally");
            }
        }
        if let Some(settlement) = self.settlement.take() {
            settlement.stop().await;
        }

        let ledger = self.container.ledger.clone();
        let settled = tokio::task::spawn_blocking(move || drain_pending(&ledger))
            .await
            .context("final settlement drain")?;
        info!(settled, remaining = self.container.ledger.pending_count(), "shutdown complete");
        Ok(())
    }
}

async fn settle_once(ledger: Arc<LedgerService>) {
    match tokio::task::spawn_blocking(move || ledger.settle()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %e, "settlement tick failed"),
        Err(e) => error!(error = %e, "settlement tick panicked"),
    }
}

/// Tick until the mempool is empty or a tick makes no progress, then make
/// sure the chain tip and whatever is still pending are on disk.
fn drain_pending(ledger: &LedgerService) -> usize {
    let mut settled = 0;
    while ledger.pending_count() > 0 {
        match ledger.settle() {
            Ok(report) if report.settled == 0 && report.dropped == 0 => break,
            Ok(report) => settled += report.settled,
            Err(e) => {
                error!(error = %e, pending = ledger.pending_count(), "final settlement failed");
                break;
            }
        }
    }
    if let Err(e) = ledger.flush_chain_tip() {
        error!(error = %e, "chain tip not persisted at shutdown");
    }
    if let Err(e) = ledger.save_pending() {
        error!(error = %e, pending = ledger.pending_count(), "pending journal not written at shutdown");
    }
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::NodeConfig;
    use k256::ecdsa::SigningKey;
    use lc_03_transaction_codec::{address_of, sign, UnsignedTransaction};
    use shared_types::{parse_units, to_hex, SystemTimeSource, U256};

    fn funded_config(dir: &std::path::Path, sender: &str) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        // Long enough that only the shutdown drain settles.
        config.settlement.tick_interval_ms = 60_000;
        config.genesis.allocations.insert(sender.to_string(), "10".into());
        config
    }

    #[tokio::test]
    async fn test_shutdown_settles_pending_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let sender = address_of(key.verifying_key());
        let config = funded_config(dir.path(), &to_hex(&sender));
        let chain_id = config.chain.chain_id;

        let container = LedgerContainer::open(config.clone(), Arc::new(SystemTimeSource)).unwrap();
        let mut runtime = NodeRuntime::new(container);
        runtime.start();

        let tx = UnsignedTransaction {
            nonce: 0,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: Some([0xBB; 20]),
            value: parse_units("1").unwrap(),
            data: vec![],
        };
        let raw = to_hex(&sign(&tx, &key, chain_id).unwrap());
        runtime.ledger().submit_raw_transaction(&raw).unwrap();
        assert_eq!(runtime.ledger().pending_count(), 1);

        runtime.shutdown().await.unwrap();

        let reopened = LedgerContainer::open(config, Arc::new(SystemTimeSource)).unwrap();
        assert_eq!(reopened.ledger.get_balance(&[0xBB; 20]), parse_units("1").unwrap());
        assert_eq!(reopened.ledger.get_nonce(&sender), 1);
        assert_eq!(reopened.ledger.next_block_index(), 1);
    }
}
