//! # Shared Bus - Ledger Event Fan-Out
//!
//! Carries settlement events and security alerts from the ledger core to
//! out-of-process collaborators (audit log, persistence, notification
//! fan-out). The core publishes and never waits on consumers.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Settlement  │    publish()       │  Audit log   │
//! │   Security   │ ──────┐            │  Persistence │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, LedgerEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging receivers drop.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
