//! # Test Fixtures
//!
//! Deterministic wallets and a ledger wired the same way the node wires it,
//! driven by a manual clock.

use anyhow::Result;
use k256::ecdsa::SigningKey;
use lc_01_account_store::AccountStore;
use lc_02_balance_cache::{CacheConfig, TieredBalanceCache};
use lc_03_transaction_codec::{address_of, sign, UnsignedTransaction};
use lc_05_security_monitor::{SecurityConfig, SecurityMonitor};
use lc_06_settlement::{Chain, LedgerParts, LedgerService, MempoolConfig, SettlementConfig};
use shared_bus::InMemoryEventBus;
use shared_types::{parse_units, to_hex, Account, Address, MockTimeSource, Timestamp, DEFAULT_CHAIN_ID, U256};
use std::sync::Arc;

/// Clock start for every harness: 2023-11-14T22:13:20Z.
pub const START: Timestamp = 1_700_000_000_000;

/// 20 gwei, the gas price used by [`Wallet::transfer`].
pub fn default_gas_price() -> U256 {
    U256::from(20_000_000_000u64)
}

pub struct Wallet {
    key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Deterministic key `[seed; 32]`. `seed` must be non-zero.
    pub fn from_seed(seed: u8) -> Result<Self> {
        let key = SigningKey::from_slice(&[seed; 32])?;
        Ok(Self::from_key(key))
    }

    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut rand::thread_rng()))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `tx` for the default chain and hex encode it.
    pub fn sign(&self, tx: &UnsignedTransaction) -> Result<String> {
        Ok(to_hex(&sign(tx, &self.key, DEFAULT_CHAIN_ID)?))
    }

    /// Plain value transfer: 21000 gas at 20 gwei, `value` in coins.
    pub fn transfer(&self, to: Address, value: &str, nonce: u64) -> Result<String> {
        self.sign(&UnsignedTransaction {
            nonce,
            gas_price: default_gas_price(),
            gas_limit: 21_000,
            to: Some(to),
            value: parse_units(value)?,
            data: vec![],
        })
    }
}

#[derive(Default)]
pub struct HarnessConfig {
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub mempool: MempoolConfig,
    pub settlement: SettlementConfig,
}

pub struct LedgerHarness {
    pub ledger: Arc<LedgerService>,
    pub clock: Arc<MockTimeSource>,
    pub bus: Arc<InMemoryEventBus>,
}

impl LedgerHarness {
    /// Volatile ledger with default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::build(AccountStore::in_memory(), Chain::in_memory(64), HarnessConfig::default())
    }

    pub fn in_memory_with(config: HarnessConfig) -> Result<Self> {
        Self::build(AccountStore::in_memory(), Chain::in_memory(64), config)
    }

    fn build(store: AccountStore, chain: Chain, config: HarnessConfig) -> Result<Self> {
        let clock = Arc::new(MockTimeSource::new(START));
        let bus = Arc::new(InMemoryEventBus::new());
        let cache = TieredBalanceCache::new(config.cache, clock.clone())?;
        let security = SecurityMonitor::new(config.security, clock.clone())?.with_publisher(bus.clone());

        let ledger = LedgerService::new(LedgerParts {
            chain_id: DEFAULT_CHAIN_ID,
            store: Arc::new(store),
            cache: Arc::new(cache),
            security: Arc::new(security),
            publisher: bus.clone(),
            clock: clock.clone(),
            chain,
            mempool: config.mempool,
            settlement: config.settlement,
        });
        Ok(Self {
            ledger: Arc::new(ledger),
            clock,
            bus,
        })
    }

    /// Overwrite `address` with a fresh account holding `coins`.
    pub fn fund(&self, address: &Address, coins: &str) -> Result<()> {
        let account = Account::with_balance(parse_units(coins)?);
        self.ledger.store().put(address, &account)?;
        self.ledger.cache().invalidate(address);
        Ok(())
    }

    /// Funded wallet with a deterministic key.
    pub fn funded_wallet(&self, seed: u8, coins: &str) -> Result<Wallet> {
        let wallet = Wallet::from_seed(seed)?;
        self.fund(&wallet.address(), coins)?;
        Ok(wallet)
    }

    /// Sum of every stored balance.
    pub fn total_supply(&self) -> Result<U256> {
        Ok(self.ledger.store().stats()?.total_balance)
    }
}
