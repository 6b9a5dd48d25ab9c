//! # End-to-End Scenarios
//!
//! Raw signed transaction in, settled block out, through the same
//! admission pipeline and settlement loop the node runs.
//!
//! ## Flow Tested
//!
//! ```text
//! raw hex ──> codec (decode + recover) ──> security gates ──> nonce reserve
//!         ──> mempool ──> settlement tick ──> store + cache + block + events
//! ```

#[cfg(test)]
mod tests {
    use crate::fixtures::{HarnessConfig, LedgerHarness};
    use lc_06_settlement::{AdmissionError, SettlementConfig};
    use shared_bus::{EventFilter, EventTopic, LedgerEvent};
    use shared_types::{parse_units, AlertType, Address};

    const B: Address = [0xB0; 20];
    const C: Address = [0xC0; 20];

    // =========================================================================
    // SCENARIO 1: PLAIN TRANSFER
    // =========================================================================

    #[test]
    fn test_transfer_settles_with_fee() {
        let h = LedgerHarness::in_memory().unwrap();
        let a = h.funded_wallet(0x01, "10").unwrap();

        let hash = h
            .ledger
            .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
            .unwrap();
        let report = h.ledger.settle().unwrap();
        assert_eq!(report.settled, 1);
        assert_eq!(report.dropped, 0);

        let block = report.block.unwrap();
        assert_eq!(block.index, 0);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].hash, hash);

        let sender = h.ledger.store().get(&a.address());
        assert_eq!(sender.balance, parse_units("8.99958").unwrap());
        assert_eq!(sender.nonce, 1);
        assert_eq!(h.ledger.store().get(&B).balance, parse_units("1").unwrap());
        assert_eq!(h.ledger.get_balance(&a.address()), parse_units("8.99958").unwrap());
    }

    // =========================================================================
    // SCENARIO 2: SAME NONCE TWICE
    // =========================================================================

    #[test]
    fn test_second_transaction_with_same_nonce_conflicts() {
        let h = LedgerHarness::in_memory().unwrap();
        let a = h.funded_wallet(0x02, "10").unwrap();

        let first = h
            .ledger
            .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
            .unwrap();
        let err = h
            .ledger
            .submit_raw_transaction(&a.transfer(C, "2", 0).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::NonceConflict {
                nonce: 0,
                next_nonce: 1,
                ..
            }
        ));
        assert!(err.is_retryable());

        let block = h.ledger.settle().unwrap().block.unwrap();
        let hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash).collect();
        assert_eq!(hashes, vec![first]);
        assert!(h.ledger.store().get(&C).balance.is_zero());
        assert_eq!(h.ledger.pending_count(), 0);
        assert!(h.ledger.settle().unwrap().block.is_none());
    }

    // =========================================================================
    // SCENARIO 3: RATE LIMIT
    // =========================================================================

    #[test]
    fn test_sixth_transaction_in_window_is_rate_limited() {
        let h = LedgerHarness::in_memory().unwrap();
        let a = h.funded_wallet(0x03, "10").unwrap();

        for nonce in 0..5 {
            h.ledger
                .submit_raw_transaction(&a.transfer(B, "1", nonce).unwrap())
                .unwrap();
            h.clock.advance(500);
        }
        // Sixth attempt 2.5 s after the first.
        let err = h
            .ledger
            .submit_raw_transaction(&a.transfer(B, "1", 5).unwrap())
            .unwrap_err();
        let AdmissionError::RateLimited { retry_after_ms, .. } = err else {
            panic!("expected RateLimited, got {err:?}");
        };
        assert!(retry_after_ms > 0 && retry_after_ms <= 10_000);
        assert_eq!(h.ledger.pending_count(), 5);
        // The rejected attempt never reserved its nonce.
        assert_eq!(h.ledger.get_nonce(&a.address()), 5);

        h.clock.advance(retry_after_ms);
        h.ledger
            .submit_raw_transaction(&a.transfer(B, "1", 5).unwrap())
            .unwrap();
        assert_eq!(h.ledger.settle().unwrap().settled, 6);
    }

    // =========================================================================
    // SCENARIO 4: DOUBLE SPEND AUTO-BLOCK
    // =========================================================================

    #[test]
    fn test_repeated_nonce_blocks_sender_until_expiry() {
        let h = LedgerHarness::in_memory().unwrap();
        let mut alerts = h.bus.subscribe(EventFilter::topics(vec![EventTopic::Security]));
        let a = h.funded_wallet(0x04, "10").unwrap();

        h.ledger
            .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
            .unwrap();
        assert!(matches!(
            h.ledger.submit_raw_transaction(&a.transfer(B, "2", 0).unwrap()),
            Err(AdmissionError::NonceConflict { .. })
        ));
        let err = h
            .ledger
            .submit_raw_transaction(&a.transfer(B, "3", 0).unwrap())
            .unwrap_err();
        let AdmissionError::Blocked { until_ms, .. } = err else {
            panic!("expected Blocked, got {err:?}");
        };
        assert!(h.ledger.security().is_blocked(&a.address()));

        // Even a well-formed next transaction is refused while blocked.
        assert!(matches!(
            h.ledger.submit_raw_transaction(&a.transfer(B, "1", 1).unwrap()),
            Err(AdmissionError::Blocked { .. })
        ));

        let double_spends = alerts
            .drain()
            .into_iter()
            .filter(|event| {
                matches!(event, LedgerEvent::SecurityAlert(alert) if alert.alert_type == AlertType::DoubleSpending)
            })
            .count();
        assert_eq!(double_spends, 2);

        // The admitted transaction still settles.
        assert_eq!(h.ledger.settle().unwrap().settled, 1);

        h.clock.set(until_ms);
        assert!(!h.ledger.security().is_blocked(&a.address()));
        h.ledger
            .submit_raw_transaction(&a.transfer(B, "1", 1).unwrap())
            .unwrap();
        assert_eq!(h.ledger.settle().unwrap().settled, 1);
        assert_eq!(h.ledger.store().get(&a.address()).nonce, 2);
    }

    // =========================================================================
    // SETTLEMENT-TIME RE-VALIDATION
    // =========================================================================

    #[test]
    fn test_balance_spent_elsewhere_drops_transaction() {
        let h = LedgerHarness::in_memory().unwrap();
        let mut events = h.bus.subscribe(EventFilter::topics(vec![EventTopic::Transactions]));
        let a = h.funded_wallet(0x05, "10").unwrap();

        h.ledger
            .submit_raw_transaction(&a.transfer(B, "5", 0).unwrap())
            .unwrap();
        // Another writer debits the account between admission and settlement.
        h.fund(&a.address(), "1").unwrap();

        let report = h.ledger.settle().unwrap();
        assert_eq!((report.settled, report.dropped), (0, 1));
        assert!(report.block.is_none());
        assert!(h.ledger.store().get(&B).balance.is_zero());

        let dropped = events
            .drain()
            .into_iter()
            .find_map(|event| match event {
                LedgerEvent::TransactionDropped { nonce, reason, .. } => Some((nonce, reason)),
                _ => None,
            })
            .unwrap();
        assert_eq!(dropped.0, 0);
        assert!(dropped.1.starts_with("insufficient balance"));

        // The nonce was released and can carry a smaller transfer.
        assert_eq!(h.ledger.get_nonce(&a.address()), 0);
        h.ledger
            .submit_raw_transaction(&a.transfer(B, "0.5", 0).unwrap())
            .unwrap();
        assert_eq!(h.ledger.settle().unwrap().settled, 1);
        assert_eq!(h.ledger.store().get(&B).balance, parse_units("0.5").unwrap());
    }

    #[test]
    fn test_batches_seal_linked_blocks() {
        let h = LedgerHarness::in_memory_with(HarnessConfig {
            settlement: SettlementConfig {
                batch_size: 2,
                ..SettlementConfig::default()
            },
            ..HarnessConfig::default()
        })
        .unwrap();

        for seed in 0x10..0x13 {
            let wallet = h.funded_wallet(seed, "3").unwrap();
            h.ledger
                .submit_raw_transaction(&wallet.transfer(C, "1", 0).unwrap())
                .unwrap();
        }

        let first = h.ledger.settle().unwrap().block.unwrap();
        let second = h.ledger.settle().unwrap().block.unwrap();
        assert_eq!(first.transactions.len(), 2);
        assert_eq!(second.transactions.len(), 1);
        assert_eq!(second.index, first.index + 1);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(h.ledger.block(0), Some(first));
        assert_eq!(h.ledger.store().get(&C).balance, parse_units("3").unwrap());
    }

    #[test]
    fn test_lifecycle_events_in_order() {
        let h = LedgerHarness::in_memory().unwrap();
        let mut events = h.bus.subscribe(EventFilter::topics(vec![EventTopic::Transactions, EventTopic::Blocks]));
        let a = h.funded_wallet(0x06, "10").unwrap();

        let hash = h
            .ledger
            .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
            .unwrap();
        h.ledger.settle().unwrap();

        let events = events.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], LedgerEvent::TransactionAdmitted { hash: h0, nonce: 0, .. } if *h0 == hash));
        assert!(matches!(&events[1], LedgerEvent::TransactionSettled { hash: h1, block_index: 0 } if *h1 == hash));
        assert!(matches!(&events[2], LedgerEvent::BlockSealed(block) if block.index == 0));
    }
}
