use crate::config::SecurityConfig;
use crate::errors::SecurityError;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{
    to_hex, Address, AlertSeverity, AlertType, Hash, SecurityAlert, TimeSource, Timestamp,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Severity of an alert of `alert_type` observed `magnitude` times.
pub fn severity_for(config: &SecurityConfig, alert_type: AlertType, magnitude: usize) -> AlertSeverity {
    let high_at = match alert_type {
        AlertType::DoubleSpending => config.replay_block_attempts,
        AlertType::RapidTransactions => config.rate_high_magnitude,
        AlertType::BalanceManipulation => config.balance_high_magnitude,
        AlertType::SelfTransfer => return AlertSeverity::Low,
    };
    if magnitude >= high_at {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    }
}

/// Active blocklist entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockEntry {
    pub until_ms: Timestamp,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SecurityStats {
    pub tracked_addresses: usize,
    pub replay_patterns: usize,
    pub active_blocks: usize,
    pub alerts_raised: u64,
}

#[derive(Debug)]
struct ReplayAttempt {
    hash: Hash,
    at: Timestamp,
}

#[derive(Debug, Default)]
struct MonitorState {
    rate: HashMap<Address, VecDeque<Timestamp>>,
    balance_failures: HashMap<Address, VecDeque<Timestamp>>,
    replay: HashMap<(Address, u64), Vec<ReplayAttempt>>,
    blocked: HashMap<Address, BlockEntry>,
    alerts: VecDeque<SecurityAlert>,
    alerts_raised: u64,
}

/// Drop timestamps that fell out of `window` ending at `now`.
fn prune_window(events: &mut VecDeque<Timestamp>, now: Timestamp, window: u64) {
    while events.front().is_some_and(|t| now.saturating_sub(*t) >= window) {
        events.pop_front();
    }
}

/// Security gates consulted by admission before any state mutation.
///
/// All state sits behind one mutex; every check is short and never does I/O
/// while holding it. Alerts are published after the lock is released.
pub struct SecurityMonitor {
    config: SecurityConfig,
    clock: Arc<dyn TimeSource>,
    publisher: Option<Arc<dyn EventPublisher>>,
    state: Mutex<MonitorState>,
}

impl SecurityMonitor {
    pub fn new(config: SecurityConfig, clock: Arc<dyn TimeSource>) -> Result<Self, SecurityError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            publisher: None,
            state: Mutex::new(MonitorState::default()),
        })
    }

    /// Publish alerts on the event bus.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Fails with `Blocked` while `address` is on the blocklist. Expired
    /// entries are removed on the way.
    pub fn check_blocked(&self, address: &Address) -> Result<(), SecurityError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        match state.blocked.get(address) {
            Some(entry) if entry.until_ms > now => Err(SecurityError::Blocked {
                address: to_hex(address),
                until_ms: entry.until_ms,
                reason: entry.reason.clone(),
            }),
            Some(_) => {
                state.blocked.remove(address);
                info!(address = %to_hex(address), "Block expired");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_blocked(&self, address: &Address) -> bool {
        self.check_blocked(address).is_err()
    }

    pub fn block_entry(&self, address: &Address) -> Option<BlockEntry> {
        let now = self.clock.now();
        self.state
            .lock()
            .blocked
            .get(address)
            .filter(|entry| entry.until_ms > now)
            .cloned()
    }

    /// Record an admission attempt. Fails once `rate_threshold` earlier
    /// attempts are still inside the window; the failed attempt is counted too.
    pub fn check_rate(&self, address: &Address) -> Result<(), SecurityError> {
        let now = self.clock.now();
        let window = self.config.rate_window_ms;
        let threshold = self.config.rate_threshold;

        let mut state = self.state.lock();
        let events = state.rate.entry(*address).or_default();
        prune_window(events, now, window);
        let prior = events.len();
        events.push_back(now);
        if prior < threshold {
            return Ok(());
        }

        let count = events.len();
        // Enough of the oldest events must age out to leave threshold - 1.
        let retry_after_ms = events
            .get(count - threshold)
            .map_or(window, |oldest| (oldest + window).saturating_sub(now));
        let alert = self.raise(
            &mut state,
            now,
            address,
            AlertType::RapidTransactions,
            count,
            json!({ "count": count, "timeWindow": window }),
        );
        drop(state);
        self.emit(alert);

        Err(SecurityError::RateLimited {
            address: to_hex(address),
            retry_after_ms,
        })
    }

    /// Record a transaction hash for `(address, nonce)`. The second distinct
    /// hash raises a MEDIUM alert; `replay_block_attempts` distinct hashes
    /// block the sender and fail. Re-sending an already seen hash is not a
    /// new attempt.
    pub fn check_replay(&self, address: &Address, nonce: u64, hash: &Hash) -> Result<(), SecurityError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let attempts = state.replay.entry((*address, nonce)).or_default();
        if attempts.iter().any(|attempt| attempt.hash == *hash) {
            return Ok(());
        }
        attempts.push(ReplayAttempt { hash: *hash, at: now });
        let count = attempts.len();
        if count < 2 {
            return Ok(());
        }

        let tx_hashes: Vec<String> = attempts.iter().map(|a| to_hex(&a.hash)).collect();
        let alert = self.raise(
            &mut state,
            now,
            address,
            AlertType::DoubleSpending,
            count,
            json!({ "nonce": nonce, "attempts": count, "txHashes": tx_hashes }),
        );
        let blocked = if count >= self.config.replay_block_attempts {
            Some(self.block_locked(
                &mut state,
                now,
                address,
                "Multiple double spending attempts",
                self.config.block_duration_ms,
            ))
        } else {
            None
        };
        drop(state);
        self.emit(alert);

        match blocked {
            Some(entry) => Err(SecurityError::Blocked {
                address: to_hex(address),
                until_ms: entry.until_ms,
                reason: entry.reason,
            }),
            None => Ok(()),
        }
    }

    /// Drop the attempt `hash` recorded for `(address, nonce)`. Used once the
    /// nonce was handed back without settling, so resubmitting it is not a
    /// replay. Returns whether an attempt was removed.
    pub fn forget_attempt(&self, address: &Address, nonce: u64, hash: &Hash) -> bool {
        let mut state = self.state.lock();
        let key = (*address, nonce);
        let Some(attempts) = state.replay.get_mut(&key) else {
            return false;
        };
        let before = attempts.len();
        attempts.retain(|attempt| attempt.hash != *hash);
        let removed = attempts.len() < before;
        if attempts.is_empty() {
            state.replay.remove(&key);
        }
        if removed {
            debug!(address = %to_hex(address), nonce, "Replay attempt forgotten");
        }
        removed
    }

    /// Record a failed balance check. `balance_threshold` failures inside the
    /// window block the sender and fail.
    pub fn check_balance_manipulation(&self, address: &Address, reason: &str) -> Result<(), SecurityError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let failures = state.balance_failures.entry(*address).or_default();
        prune_window(failures, now, self.config.balance_window_ms);
        failures.push_back(now);
        let count = failures.len();
        if count < self.config.balance_threshold {
            debug!(address = %to_hex(address), failures = count, "Balance check failure recorded");
            return Ok(());
        }

        let alert = self.raise(
            &mut state,
            now,
            address,
            AlertType::BalanceManipulation,
            count,
            json!({ "attempts": count, "reason": reason }),
        );
        let entry = self.block_locked(
            &mut state,
            now,
            address,
            "Repeated balance manipulation attempts",
            self.config.block_duration_ms,
        );
        drop(state);
        self.emit(alert);

        Err(SecurityError::Blocked {
            address: to_hex(address),
            until_ms: entry.until_ms,
            reason: entry.reason,
        })
    }

    /// Raise an alert. HIGH severity blocks the address.
    pub fn flag(&self, address: &Address, alert_type: AlertType, magnitude: usize, details: Value) -> SecurityAlert {
        let now = self.clock.now();
        let alert = {
            let mut state = self.state.lock();
            self.raise(&mut state, now, address, alert_type, magnitude, details)
        };
        self.emit(alert.clone());
        alert
    }

    /// Block `address` for `duration_ms`. An existing longer block is kept.
    pub fn block(&self, address: &Address, reason: &str, duration_ms: u64) -> BlockEntry {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.block_locked(&mut state, now, address, reason, duration_ms)
    }

    pub fn unblock(&self, address: &Address) -> bool {
        let removed = self.state.lock().blocked.remove(address).is_some();
        if removed {
            info!(address = %to_hex(address), "Address unblocked");
        }
        removed
    }

    /// Purge records older than the retention horizon and expired blocks.
    /// Returns the number of keys removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let retention = self.config.retention_ms;
        let fresh = |t: &Timestamp| now.saturating_sub(*t) < retention;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let before = state.rate.len() + state.balance_failures.len() + state.replay.len() + state.blocked.len();

        for events in state.rate.values_mut().chain(state.balance_failures.values_mut()) {
            events.retain(fresh);
        }
        state.rate.retain(|_, events| !events.is_empty());
        state.balance_failures.retain(|_, events| !events.is_empty());
        state.replay.retain(|_, attempts| {
            attempts.retain(|attempt| fresh(&attempt.at));
            !attempts.is_empty()
        });
        state.blocked.retain(|_, entry| entry.until_ms > now);

        let after = state.rate.len() + state.balance_failures.len() + state.replay.len() + state.blocked.len();
        let removed = before - after;
        info!(removed, remaining = after, "Security monitor cleanup completed");
        removed
    }

    /// Up to `limit` most recent alerts, oldest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<SecurityAlert> {
        let state = self.state.lock();
        let skip = state.alerts.len().saturating_sub(limit);
        state.alerts.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> SecurityStats {
        let now = self.clock.now();
        let state = self.state.lock();
        let tracked: HashSet<&Address> = state
            .rate
            .keys()
            .chain(state.balance_failures.keys())
            .chain(state.replay.keys().map(|(address, _)| address))
            .collect();
        SecurityStats {
            tracked_addresses: tracked.len(),
            replay_patterns: state.replay.len(),
            active_blocks: state.blocked.values().filter(|e| e.until_ms > now).count(),
            alerts_raised: state.alerts_raised,
        }
    }

    fn raise(
        &self,
        state: &mut MonitorState,
        now: Timestamp,
        address: &Address,
        alert_type: AlertType,
        magnitude: usize,
        details: Value,
    ) -> SecurityAlert {
        let severity = severity_for(&self.config, alert_type, magnitude);
        let alert = SecurityAlert {
            timestamp: now,
            address: *address,
            alert_type,
            severity,
            details,
        };
        warn!(
            address = %to_hex(address),
            alert_type = %alert_type,
            severity = ?severity,
            details = %alert.details,
            "Suspicious activity detected"
        );

        state.alerts_raised += 1;
        if state.alerts.len() == self.config.alert_capacity {
            state.alerts.pop_front();
        }
        state.alerts.push_back(alert.clone());

        if severity == AlertSeverity::High {
            let reason = format!("High severity {alert_type} detected");
            self.block_locked(state, now, address, &reason, self.config.block_duration_ms);
        }
        alert
    }

    fn block_locked(
        &self,
        state: &mut MonitorState,
        now: Timestamp,
        address: &Address,
        reason: &str,
        duration_ms: u64,
    ) -> BlockEntry {
        let until_ms = now.saturating_add(duration_ms);
        let entry = state
            .blocked
            .entry(*address)
            .and_modify(|entry| {
                if until_ms >= entry.until_ms {
                    entry.until_ms = until_ms;
                    entry.reason = reason.to_string();
                }
            })
            .or_insert_with(|| BlockEntry {
                until_ms,
                reason: reason.to_string(),
            })
            .clone();
        warn!(address = %to_hex(address), until_ms = entry.until_ms, reason = %entry.reason, "Address blocked");
        entry
    }

    fn emit(&self, alert: SecurityAlert) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(LedgerEvent::SecurityAlert(alert));
        }
    }
}
