//! # Ledger Events
//!
//! Everything the ledger core announces to its collaborators.

use serde::{Deserialize, Serialize};
use shared_types::{encoding, Address, Block, Hash, SecurityAlert};

/// All events that can be published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LedgerEvent {
    /// A transaction passed admission and entered the mempool.
    TransactionAdmitted {
        #[serde(with = "encoding::hex_array")]
        hash: Hash,
        #[serde(with = "encoding::hex_array")]
        from: Address,
        nonce: u64,
    },

    /// A pending transaction was withdrawn before settlement.
    TransactionWithdrawn {
        #[serde(with = "encoding::hex_array")]
        hash: Hash,
    },

    /// A transaction was applied to the ledger.
    TransactionSettled {
        #[serde(with = "encoding::hex_array")]
        hash: Hash,
        block_index: u64,
    },

    /// A pending transaction failed re-validation at settlement time and
    /// its nonce reservation was released.
    TransactionDropped {
        #[serde(with = "encoding::hex_array")]
        hash: Hash,
        #[serde(with = "encoding::hex_array")]
        from: Address,
        nonce: u64,
        reason: String,
    },

    /// A block was sealed and appended to the chain.
    BlockSealed(Block),

    /// The security monitor raised an alert.
    SecurityAlert(SecurityAlert),
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Admission, withdrawal, settlement and drop of individual transactions.
    Transactions,
    /// Sealed blocks.
    Blocks,
    /// Security alerts.
    Security,
}

impl LedgerEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            LedgerEvent::TransactionAdmitted { .. }
            | LedgerEvent::TransactionWithdrawn { .. }
            | LedgerEvent::TransactionSettled { .. }
            | LedgerEvent::TransactionDropped { .. } => EventTopic::Transactions,
            LedgerEvent::BlockSealed(_) => EventTopic::Blocks,
            LedgerEvent::SecurityAlert(_) => EventTopic::Security,
        }
    }
}

/// Filter for subscribing to specific event types.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to subscribe to. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that matches all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}
