//! # Ledger Properties
//!
//! Invariants that must hold for any sequence of admissions and ticks.

#[cfg(test)]
mod tests {
    use crate::fixtures::{HarnessConfig, LedgerHarness, Wallet};
    use lc_02_balance_cache::{CacheConfig, Tier, TieredBalanceCache};
    use lc_03_transaction_codec::{decode, encode, TransactionCodec};
    use lc_06_settlement::{AdmissionError, SettlementConfig};
    use shared_types::{parse_units, Account, Address, MockTimeSource, DEFAULT_CHAIN_ID, U256};
    use std::collections::HashMap;
    use std::sync::Arc;

    const SINK: Address = [0x5E; 20];

    #[test]
    fn test_identical_bytes_settle_at_most_once() {
        let h = LedgerHarness::in_memory().unwrap();
        let a = h.funded_wallet(0x31, "10").unwrap();
        let raw = a.transfer(SINK, "1", 0).unwrap();

        h.ledger.submit_raw_transaction(&raw).unwrap();
        assert!(matches!(
            h.ledger.submit_raw_transaction(&raw),
            Err(AdmissionError::DuplicateTransaction(_))
        ));
        assert_eq!(h.ledger.settle().unwrap().settled, 1);

        assert!(matches!(
            h.ledger.submit_raw_transaction(&raw),
            Err(AdmissionError::NonceConflict { .. })
        ));
        assert!(h.ledger.settle().unwrap().block.is_none());
        assert_eq!(h.ledger.get_balance(&SINK), parse_units("1").unwrap());
        // Resending the same hash is never counted as a replay.
        assert!(!h.ledger.security().is_blocked(&a.address()));
    }

    #[test]
    fn test_committed_nonces_increase_without_gaps() {
        let h = LedgerHarness::in_memory_with(HarnessConfig {
            settlement: SettlementConfig {
                batch_size: 4,
                ..SettlementConfig::default()
            },
            ..HarnessConfig::default()
        })
        .unwrap();
        let wallets: Vec<Wallet> = (0x40..0x43).map(|seed| h.funded_wallet(seed, "100").unwrap()).collect();

        // Interleave senders so every block mixes them.
        for nonce in 0..5 {
            for wallet in &wallets {
                h.ledger
                    .submit_raw_transaction(&wallet.transfer(SINK, "1", nonce).unwrap())
                    .unwrap();
            }
        }

        let mut settled_nonces: HashMap<Address, Vec<u64>> = HashMap::new();
        let mut last_seen: HashMap<Address, u64> = HashMap::new();
        while let Some(block) = h.ledger.settle().unwrap().block {
            for tx in &block.transactions {
                settled_nonces.entry(tx.from).or_default().push(tx.nonce);
            }
            for wallet in &wallets {
                let nonce = h.ledger.store().get(&wallet.address()).nonce;
                let previous = last_seen.insert(wallet.address(), nonce).unwrap_or(0);
                assert!(nonce >= previous);
            }
        }

        for wallet in &wallets {
            assert_eq!(settled_nonces[&wallet.address()], vec![0, 1, 2, 3, 4]);
            assert_eq!(h.ledger.store().get(&wallet.address()).nonce, 5);
        }
        assert_eq!(h.ledger.get_balance(&SINK), parse_units("15").unwrap());
    }

    #[test]
    fn test_supply_is_conserved_when_fees_are_collected() {
        let collector = [0xFE; 20];
        let h = LedgerHarness::in_memory_with(HarnessConfig {
            settlement: SettlementConfig {
                fee_recipient: Some(collector),
                ..SettlementConfig::default()
            },
            ..HarnessConfig::default()
        })
        .unwrap();
        let a = h.funded_wallet(0x50, "5").unwrap();
        let b = h.funded_wallet(0x51, "5").unwrap();
        let before = h.total_supply().unwrap();

        h.ledger
            .submit_raw_transaction(&a.transfer(b.address(), "2", 0).unwrap())
            .unwrap();
        h.ledger
            .submit_raw_transaction(&b.transfer(a.address(), "1", 0).unwrap())
            .unwrap();
        h.ledger.settle().unwrap();

        assert_eq!(h.total_supply().unwrap(), before);
        assert_eq!(h.ledger.get_balance(&collector), parse_units("0.00084").unwrap());
    }

    #[test]
    fn test_fees_are_burned_without_recipient() {
        let h = LedgerHarness::in_memory().unwrap();
        let a = h.funded_wallet(0x52, "5").unwrap();
        let before = h.total_supply().unwrap();

        h.ledger
            .submit_raw_transaction(&a.transfer(SINK, "1", 0).unwrap())
            .unwrap();
        h.ledger.settle().unwrap();

        assert_eq!(before - h.total_supply().unwrap(), parse_units("0.00042").unwrap());
    }

    #[test]
    fn test_balance_read_after_put_and_invalidate_is_fresh() {
        let h = LedgerHarness::in_memory().unwrap();
        let address = [0x77; 20];
        h.fund(&address, "10").unwrap();
        assert_eq!(h.ledger.get_balance(&address), parse_units("10").unwrap());

        let updated = Account::with_balance(parse_units("3").unwrap());
        h.ledger.store().put(&address, &updated).unwrap();
        h.ledger.cache().invalidate(&address);
        assert_eq!(h.ledger.get_balance(&address), parse_units("3").unwrap());
    }

    #[test]
    fn test_l1_overflow_evicts_one_entry_into_l2() {
        let config = CacheConfig {
            l1_capacity: 2,
            l2_capacity: 4,
            l3_capacity: 8,
            ..CacheConfig::default()
        };
        let cache = TieredBalanceCache::new(config, Arc::new(MockTimeSource::new(0))).unwrap();

        for i in 1..=3u8 {
            cache.set_balance([i; 20], U256::from(i));
        }

        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.tier_of(&[1; 20]), Some(Tier::L2));
        assert_eq!(cache.tier_of(&[3; 20]), Some(Tier::L1));
        assert_eq!(cache.get_balance(&[1; 20]), Some(U256::from(1u8)));
    }

    #[test]
    fn test_recovered_sender_is_the_signer() {
        let wallet = Wallet::random();
        let raw = wallet.transfer(SINK, "0.25", 7).unwrap();

        let codec = TransactionCodec::new(DEFAULT_CHAIN_ID);
        let tx = codec.decode_hex_and_recover(&raw).unwrap();
        assert_eq!(tx.from, wallet.address());
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.to, Some(SINK));

        let bytes = shared_types::decode_hex(&raw).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decode(&encode(&decoded)).unwrap(), decoded);

        // A different chain id recovers someone else or fails outright.
        let foreign = TransactionCodec::new(1);
        assert_ne!(foreign.decode_hex_and_recover(&raw).ok().map(|tx| tx.from), Some(wallet.address()));
    }

    #[test]
    fn test_concurrent_same_nonce_submissions_have_one_winner() {
        let h = LedgerHarness::in_memory().unwrap();
        let a = h.funded_wallet(0x60, "100").unwrap();
        let raws: Vec<String> = (1..=8)
            .map(|value| a.transfer(SINK, &value.to_string(), 0).unwrap())
            .collect();

        let admitted = std::thread::scope(|scope| {
            let handles: Vec<_> = raws
                .iter()
                .map(|raw| {
                    let ledger = h.ledger.clone();
                    scope.spawn(move || ledger.submit_raw_transaction(raw).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(admitted, 1);
        assert_eq!(h.ledger.pending_count(), 1);
        assert_eq!(h.ledger.settle().unwrap().settled, 1);
        assert_eq!(h.ledger.store().get(&a.address()).nonce, 1);
    }
}
