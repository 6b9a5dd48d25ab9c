//! # Restart Durability
//!
//! Every test here opens a real data directory, drops the node, and opens
//! the directory again. Nothing survives except what was written to disk.

#[cfg(test)]
mod tests {
    use crate::fixtures::{Wallet, START};
    use lc_01_account_store::{AccountStore, StoreError};
    use lc_06_settlement::AdmissionError;
    use node_runtime::{LedgerContainer, NodeConfig};
    use shared_types::{parse_units, to_hex, Account, Address, MockTimeSource, U256};
    use std::path::Path;
    use std::sync::Arc;

    const B: Address = [0xB0; 20];

    fn config(dir: &Path, funded: &Wallet) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config
            .genesis
            .allocations
            .insert(to_hex(&funded.address()), "10".into());
        config
    }

    fn open(config: &NodeConfig) -> LedgerContainer {
        LedgerContainer::open(config.clone(), Arc::new(MockTimeSource::new(START))).unwrap()
    }

    // =========================================================================
    // SCENARIO 5: PUT SURVIVES RESTART
    // =========================================================================

    #[test]
    fn test_put_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let address = [0xA5; 20];
        let account = Account {
            nonce: 3,
            balance: parse_units("7.25").unwrap(),
            ..Account::default()
        };

        {
            let store = AccountStore::open(dir.path()).unwrap();
            store.put(&address, &account).unwrap();
        }

        let store = AccountStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&address), account);
        assert_eq!(store.stats().unwrap().total_accounts, 1);
    }

    #[test]
    fn test_directory_is_single_writer() {
        let dir = tempfile::tempdir().unwrap();
        let _held = AccountStore::open(dir.path()).unwrap();
        assert!(matches!(AccountStore::open(dir.path()), Err(StoreError::DataDir(_))));
    }

    // =========================================================================
    // SETTLED STATE AND CHAIN TIP
    // =========================================================================

    #[test]
    fn test_settled_state_and_chain_continue_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let a = Wallet::from_seed(0x21).unwrap();
        let config = config(dir.path(), &a);

        let first_block = {
            let node = open(&config);
            node.ledger
                .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
                .unwrap();
            node.ledger.settle().unwrap().block.unwrap()
        };

        let node = open(&config);
        assert_eq!(node.ledger.get_balance(&a.address()), parse_units("8.99958").unwrap());
        assert_eq!(node.ledger.get_balance(&B), parse_units("1").unwrap());
        assert_eq!(node.ledger.get_nonce(&a.address()), 1);
        assert_eq!(node.ledger.next_block_index(), 1);
        // Only the tip is persisted, not block bodies.
        assert!(node.ledger.latest_block().is_none());

        node.ledger
            .submit_raw_transaction(&a.transfer(B, "1", 1).unwrap())
            .unwrap();
        let second_block = node.ledger.settle().unwrap().block.unwrap();
        assert_eq!(second_block.index, 1);
        assert_eq!(second_block.previous_hash, first_block.hash);
    }

    #[test]
    fn test_settled_transaction_cannot_be_replayed_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let a = Wallet::from_seed(0x22).unwrap();
        let config = config(dir.path(), &a);
        let raw = a.transfer(B, "1", 0).unwrap();

        {
            let node = open(&config);
            node.ledger.submit_raw_transaction(&raw).unwrap();
            node.ledger.settle().unwrap();
        }

        let node = open(&config);
        assert!(matches!(
            node.ledger.submit_raw_transaction(&raw),
            Err(AdmissionError::NonceConflict { nonce: 0, next_nonce: 1, .. })
        ));
        assert_eq!(node.ledger.get_balance(&B), parse_units("1").unwrap());
    }

    #[test]
    fn test_checkpointed_pending_transactions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let a = Wallet::from_seed(0x23).unwrap();
        let config = config(dir.path(), &a);

        let late = {
            let node = open(&config);
            node.ledger
                .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
                .unwrap();
            node.ledger
                .submit_raw_transaction(&a.transfer(B, "1", 1).unwrap())
                .unwrap();
            assert_eq!(node.ledger.save_pending().unwrap(), Some(2));
            node.ledger
                .submit_raw_transaction(&a.transfer(B, "1", 2).unwrap())
                .unwrap()
        };

        // Only what the last checkpoint held comes back.
        let node = open(&config);
        assert_eq!(node.ledger.pending_count(), 2);
        assert!(node.ledger.pending_transaction(&late).is_none());
        assert_eq!(node.ledger.get_nonce(&a.address()), 2);

        let report = node.ledger.settle().unwrap();
        assert_eq!(report.settled, 2);
        assert_eq!(node.ledger.get_balance(&B), parse_units("2").unwrap());
    }

    #[test]
    fn test_admissions_after_last_checkpoint_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let a = Wallet::from_seed(0x25).unwrap();
        let config = config(dir.path(), &a);

        {
            let node = open(&config);
            node.ledger
                .submit_raw_transaction(&a.transfer(B, "1", 0).unwrap())
                .unwrap();
            assert_eq!(node.ledger.pending_count(), 1);
        }

        let node = open(&config);
        assert_eq!(node.ledger.pending_count(), 0);
        assert_eq!(node.ledger.get_nonce(&a.address()), 0);
        assert_eq!(node.ledger.get_balance(&a.address()), parse_units("10").unwrap());
    }

    #[test]
    fn test_proofs_after_restart_match_recorded_root() {
        let dir = tempfile::tempdir().unwrap();
        let a = Wallet::from_seed(0x24).unwrap();
        let config = config(dir.path(), &a);

        let root = {
            let node = open(&config);
            node.ledger
                .submit_raw_transaction(&a.transfer(B, "2", 0).unwrap())
                .unwrap();
            node.ledger.settle().unwrap();
            node.ledger.store().state_root_at(0).unwrap()
        };

        // The trie is rebuilt from the snapshot on first use.
        let node = open(&config);
        let store = node.ledger.store();
        assert_eq!(store.state_root().unwrap(), root);

        let proof = node.ledger.create_proof(&B).unwrap().unwrap();
        assert_eq!(
            proof.account.as_ref().map(|account| account.balance),
            Some(parse_units("2").unwrap())
        );
        assert!(store.verify_proof(&B, &proof, &root));
        assert!(!store.verify_proof(&B, &proof, &[0u8; 32]));
    }

    #[test]
    fn test_backup_restores_into_fresh_directory() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let backup = source_dir.path().join("backup.json");

        let balance = U256::from(123_456u64);
        {
            let store = AccountStore::open(source_dir.path()).unwrap();
            store.put(&B, &Account::with_balance(balance)).unwrap();
            store.backup(&backup).unwrap();
        }

        let store = AccountStore::open(target_dir.path()).unwrap();
        assert_eq!(store.restore(&backup).unwrap(), 1);
        drop(store);

        let reopened = AccountStore::open(target_dir.path()).unwrap();
        assert_eq!(reopened.get(&B).balance, balance);
    }
}
