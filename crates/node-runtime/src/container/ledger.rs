//! Wiring, in dependency order:
//!
//! ```text
//! AccountStore ─┬─> TieredBalanceCache
//!               ├─> Chain (tip from the same directory)
//! EventBus ─────┼─> SecurityMonitor
//!               └─> LedgerService (mempool, nonces, settlement)
//!                        └─> pending journal (mempool.json, re-admitted)
//! ```

use crate::container::config::NodeConfig;
use crate::genesis::apply_genesis;
use anyhow::{Context, Result};
use lc_01_account_store::AccountStore;
use lc_02_balance_cache::TieredBalanceCache;
use lc_05_security_monitor::SecurityMonitor;
use lc_06_settlement::{Chain, LedgerParts, LedgerService, PendingJournal};
use shared_bus::InMemoryEventBus;
use shared_types::TimeSource;
use std::sync::Arc;
use tracing::info;

pub struct LedgerContainer {
    pub config: NodeConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub ledger: Arc<LedgerService>,
}

impl LedgerContainer {
    /// Validate `config`, open its data directory and build the ledger.
    pub fn open(config: NodeConfig, clock: Arc<dyn TimeSource>) -> Result<Self> {
        config.validate().context("configuration rejected")?;
        let data_dir = &config.storage.data_dir;

        let store = AccountStore::open(data_dir)
            .with_context(|| format!("opening account store in {}", data_dir.display()))?
            .with_root_history(config.storage.state_root_history);
        let chain = Chain::open(data_dir, config.settlement.retained_blocks).context("reading chain tip")?;

        let seeded = apply_genesis(&store, &config.genesis, chain.tip().is_none())
            .context("applying genesis allocations")?;
        if seeded > 0 {
            info!(accounts = seeded, "genesis allocations written");
        }

        let store = Arc::new(store);
        let cache = Arc::new(TieredBalanceCache::new(config.cache.clone(), clock.clone()).context("building balance cache")?);
        let bus = Arc::new(InMemoryEventBus::new());
        let security = Arc::new(
            SecurityMonitor::new(config.security.clone(), clock.clone())
                .context("building security monitor")?
                .with_publisher(bus.clone()),
        );

        let ledger = LedgerService::new(LedgerParts {
            chain_id: config.chain.chain_id,
            store,
            cache,
            security,
            publisher: bus.clone(),
            clock,
            chain,
            mempool: config.mempool.clone(),
            settlement: config.settlement.clone(),
        })
        .with_pending_journal(PendingJournal::new(data_dir));
        ledger.restore_pending().context("restoring pending transactions")?;
        let ledger = Arc::new(ledger);

        info!(
            data_dir = %data_dir.display(),
            chain_id = config.chain.chain_id,
            next_block = ledger.next_block_index(),
            pending = ledger.pending_count(),
            "ledger opened"
        );
        Ok(Self { config, bus, ledger })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{MockTimeSource, U256};

    fn config_in(dir: &std::path::Path) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config
            .genesis
            .allocations
            .insert("0x1111111111111111111111111111111111111111".into(), "10".into());
        config
    }

    #[test]
    fn test_open_seeds_genesis_once() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockTimeSource::new(1_000));
        let container = LedgerContainer::open(config_in(dir.path()), clock.clone()).unwrap();
        let funded = U256::from(10u64) * U256::exp10(18);
        assert_eq!(container.ledger.get_balance(&[0x11; 20]), funded);
        drop(container);

        let mut changed = config_in(dir.path());
        changed
            .genesis
            .allocations
            .insert("0x1111111111111111111111111111111111111111".into(), "99".into());
        let reopened = LedgerContainer::open(changed, clock).unwrap();
        assert_eq!(reopened.ledger.get_balance(&[0x11; 20]), funded);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.settlement.batch_size = 0;
        let clock = Arc::new(MockTimeSource::new(0));
        assert!(LedgerContainer::open(config, clock).is_err());
        assert!(!dir.path().join("accounts.json").exists());
    }

    #[test]
    fn test_second_open_of_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockTimeSource::new(0));
        let _first = LedgerContainer::open(config_in(dir.path()), clock.clone()).unwrap();
        assert!(LedgerContainer::open(config_in(dir.path()), clock).is_err());
    }
}
