use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::balance::Balance;
use crate::schemas::WalletAddress;
use crate::settlement::SettlementDesk;

/// Issued when a balance refresh starts; only the newest ticket may publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// Everything the service knows about one connected wallet.
#[derive(Debug)]
pub struct Session {
    identity: WalletAddress,
    connected_at: DateTime<Utc>,
    generation: AtomicU64,
    desk: Mutex<SettlementDesk>,
}

impl Session {
    pub fn new(identity: WalletAddress, fee: f64) -> Self {
        Session {
            identity,
            connected_at: Utc::now(),
            generation: AtomicU64::new(0),
            desk: Mutex::new(SettlementDesk::new(fee)),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Replaces the presented balances unless a newer refresh has started since
    /// `ticket` was issued. Returns whether the balances were published.
    pub fn publish(&self, ticket: RefreshTicket, balances: Vec<Balance>) -> bool {
        let mut desk = self.desk();
        if self.generation.load(Ordering::SeqCst) != ticket.0 {
            debug!(identity = %self.identity, ticket = ticket.0, "discarding stale balances");
            return false;
        }
        desk.replace_balances(balances);
        true
    }

    pub fn desk(&self) -> MutexGuard<'_, SettlementDesk> {
        // A panic while holding the lock leaves the desk in a valid state
        self.desk.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<WalletAddress, Arc<Session>>>,
}

impl SessionRegistry {
    /// Starts a fresh session for `identity`, dropping any previous one.
    pub fn connect(&self, identity: &str, fee: f64) -> Arc<Session> {
        let session = Arc::new(Session::new(identity.to_string(), fee));
        self.write()
            .insert(identity.to_string(), Arc::clone(&session));
        info!(identity, "wallet connected");
        session
    }

    pub fn disconnect(&self, identity: &str) -> bool {
        let removed = self.write().remove(identity).is_some();
        if removed {
            info!(identity, "wallet disconnected");
        }
        removed
    }

    pub fn get(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identity)
            .cloned()
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.get(identity).is_some()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<WalletAddress, Arc<Session>>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(amount: f64) -> Balance {
        Balance {
            debtor: "A".into(),
            creditor: "B".into(),
            amount,
            group_id: "g1".into(),
            group_name: "Trip".into(),
        }
    }

    #[test]
    fn stale_refreshes_do_not_overwrite_newer_ones() {
        let session = Session::new("A".into(), 0.001);
        let first = session.begin_refresh();
        let second = session.begin_refresh();

        assert!(session.publish(second, vec![balance(2.0)]));
        assert!(!session.publish(first, vec![balance(1.0)]));
        assert_eq!(session.desk().balances(), &[balance(2.0)]);
    }

    #[test]
    fn reconnecting_starts_a_clean_session() {
        let registry = SessionRegistry::default();
        let old = registry.connect("A", 0.001);
        let ticket = old.begin_refresh();
        old.publish(ticket, vec![balance(3.0)]);

        let new = registry.connect("A", 0.001);
        assert!(new.desk().balances().is_empty());
        assert!(registry.is_connected("A"));
        assert!(!registry.is_connected("B"));

        assert!(registry.disconnect("A"));
        assert!(registry.get("A").is_none());
        assert!(!registry.disconnect("A"));
    }
}
