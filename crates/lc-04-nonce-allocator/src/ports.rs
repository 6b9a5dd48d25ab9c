use shared_types::Address;

/// Durable settlement history: the number of transactions committed for an
/// address (its account nonce).
pub trait CommittedNonceSource: Send + Sync {
    fn committed_nonce(&self, address: &Address) -> u64;
}

impl<F> CommittedNonceSource for F
where
    F: Fn(&Address) -> u64 + Send + Sync,
{
    fn committed_nonce(&self, address: &Address) -> u64 {
        self(address)
    }
}
