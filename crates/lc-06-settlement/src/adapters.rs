use lc_01_account_store::AccountStore;
use lc_04_nonce_allocator::CommittedNonceSource;
use shared_types::Address;
use std::sync::Arc;

/// Seeds the nonce allocator from settled account nonces.
pub struct StoreNonceSource(pub Arc<AccountStore>);

impl CommittedNonceSource for StoreNonceSource {
    fn committed_nonce(&self, address: &Address) -> u64 {
        self.0.get(address).nonce
    }
}
