//! Owned reconciliation state for one stream session.
//!
//! Both bounded buffers and the id registry live behind a single synchronous
//! `apply(event)` funnel. The stream client is the only writer, so each frame
//! is fully reconciled before the next one is looked at.
//!
//! Reconciliation contract:
//! - a new transaction is inserted newest-first; eviction unregisters the
//!   evicted id so the registry never holds a dangling entry;
//! - an alert always lands in the alert buffer; if it embeds a transaction
//!   snapshot, the matching buffered transaction is fraud-marked in place,
//!   or the snapshot is inserted as a fraud-marked transaction when the
//!   original was evicted or never seen. A fraud verdict is never dropped.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::buffer::BoundedBuffer;
use crate::models::{FraudAlert, Transaction};

/// One decoded frame from the push feed.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Transaction(Transaction),
    Alert(FraudAlert),
}

#[derive(Debug)]
pub struct MonitorState {
    transactions: BoundedBuffer<Transaction>,
    alerts: BoundedBuffer<FraudAlert>,
    /// Ids currently present in the transaction buffer. Synthetic entries
    /// without a backend id are buffered but never registered.
    registry: HashSet<i64>,
}

impl MonitorState {
    pub fn new(transaction_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            transactions: BoundedBuffer::new(transaction_capacity),
            alerts: BoundedBuffer::new(alert_capacity),
            registry: HashSet::with_capacity(transaction_capacity),
        }
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Transaction(tx) => self.insert_transaction(tx),
            StreamEvent::Alert(alert) => self.apply_alert(alert),
        }
    }

    fn insert_transaction(&mut self, tx: Transaction) {
        // An id that is already buffered (alert synthesized it first, or a
        // seed/push overlap redelivered it) merges into the existing entry:
        // position stays, and the fraud flag only ever goes false -> true.
        if let Some(id) = tx.id {
            if self.registry.contains(&id) {
                if let Some(entry) =
                    self.transactions.iter_mut().find(|t| t.id == Some(id))
                {
                    entry.is_fraud = entry.is_fraud || tx.is_fraud;
                }
                return;
            }
        }

        let id = tx.id;
        if let Some(evicted) = self.transactions.insert(tx) {
            if let Some(evicted_id) = evicted.id {
                self.registry.remove(&evicted_id);
            }
        }
        if let Some(id) = id {
            self.registry.insert(id);
        }
    }

    fn apply_alert(&mut self, alert: FraudAlert) {
        if let Some(snapshot) = alert.transaction.clone() {
            match snapshot.id {
                Some(id) if self.registry.contains(&id) => {
                    // Patch in place: ordering and every other field stay
                    // untouched, and re-marking an already-marked entry is a
                    // no-op, so redelivered alerts are harmless.
                    if let Some(entry) =
                        self.transactions.iter_mut().find(|t| t.id == Some(id))
                    {
                        entry.is_fraud = true;
                    }
                }
                _ => {
                    // Evicted earlier, or the new_transaction event was never
                    // delivered. Keep the verdict anyway.
                    debug!(
                        id = ?snapshot.id,
                        rule = alert.reason(),
                        "alert references unbuffered transaction; inserting snapshot"
                    );
                    let mut tx = snapshot;
                    tx.is_fraud = true;
                    self.insert_transaction(tx);
                }
            }
        }
        self.alerts.insert(alert);
    }

    /// Flip the highlight off for a transaction. Only ever `true -> false`;
    /// identity and the fraud flag are untouched.
    pub fn clear_highlight(&mut self, id: i64) {
        if let Some(entry) = self.transactions.iter_mut().find(|t| t.id == Some(id)) {
            entry.is_new = false;
        }
    }

    /// Load a startup snapshot. Input lists are newest-first (as the REST
    /// endpoints return them); they are replayed oldest-first through the
    /// normal insert path so the buffers end up newest-first and bounded.
    pub fn seed(&mut self, transactions: Vec<Transaction>, alerts: Vec<FraudAlert>) {
        for tx in transactions.into_iter().rev() {
            self.insert_transaction(tx);
        }
        for alert in alerts.into_iter().rev() {
            self.apply_alert(alert);
        }
    }

    /// Newest-first view of buffered transactions.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.iter().cloned().collect()
    }

    /// Newest-first view of buffered alerts.
    pub fn alerts(&self) -> Vec<FraudAlert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn fraud_count(&self) -> usize {
        self.transactions.iter().filter(|t| t.is_fraud).count()
    }

    pub fn is_registered(&self, id: i64) -> bool {
        self.registry.contains(&id)
    }

    pub fn registered_ids(&self) -> HashSet<i64> {
        self.registry.clone()
    }

    pub fn transaction_capacity(&self) -> usize {
        self.transactions.capacity()
    }

    pub fn alert_capacity(&self) -> usize {
        self.alerts.capacity()
    }
}

/// Cheap clonable handle the stream client and consumers share.
/// Mutation still flows through the single dispatch path; readers only clone.
#[derive(Clone)]
pub struct MonitorHandle {
    inner: Arc<RwLock<MonitorState>>,
}

impl MonitorHandle {
    pub fn new(transaction_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MonitorState::new(
                transaction_capacity,
                alert_capacity,
            ))),
        }
    }

    pub fn apply(&self, event: StreamEvent) {
        self.inner.write().apply(event);
    }

    pub fn clear_highlight(&self, id: i64) {
        self.inner.write().clear_highlight(id);
    }

    pub fn seed(&self, transactions: Vec<Transaction>, alerts: Vec<FraudAlert>) {
        self.inner.write().seed(transactions, alerts);
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.read().transactions()
    }

    pub fn alerts(&self) -> Vec<FraudAlert> {
        self.inner.read().alerts()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.read().transaction_count()
    }

    pub fn alert_count(&self) -> usize {
        self.inner.read().alert_count()
    }

    pub fn fraud_count(&self) -> usize {
        self.inner.read().fraud_count()
    }

    pub fn transaction_capacity(&self) -> usize {
        self.inner.read().transaction_capacity()
    }

    pub fn alert_capacity(&self) -> usize {
        self.inner.read().alert_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tx(id: i64, user: &str, amount: f64) -> Transaction {
        Transaction {
            id: Some(id),
            ..Transaction::synthetic(user, amount)
        }
    }

    fn alert_for(snapshot: Transaction, rule: &str) -> FraudAlert {
        FraudAlert {
            id: Some(format!("alert-{}", snapshot.id.unwrap_or_default())),
            rule_name: Some(rule.to_string()),
            details: None,
            user_id: Some(snapshot.user_id.clone()),
            amount: None,
            status: None,
            timestamp: None,
            transaction: Some(snapshot),
        }
    }

    fn buffered_ids(state: &MonitorState) -> HashSet<i64> {
        state
            .transactions()
            .iter()
            .filter_map(|t| t.id)
            .collect()
    }

    #[test]
    fn test_registry_matches_buffer_under_eviction() {
        let mut state = MonitorState::new(3, 3);
        for i in 0..10 {
            state.apply(StreamEvent::Transaction(tx(i, "u1", 10.0)));
            assert!(state.transaction_count() <= 3);
            assert_eq!(state.registered_ids(), buffered_ids(&state));
        }
        assert!(!state.is_registered(0));
        assert!(state.is_registered(9));
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut state = MonitorState::new(2, 2);
        state.apply(StreamEvent::Transaction(tx(1, "u1", 1.0)));
        state.apply(StreamEvent::Transaction(tx(2, "u2", 2.0)));
        state.apply(StreamEvent::Transaction(tx(3, "u3", 3.0)));

        let ids: Vec<Option<i64>> = state.transactions().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(3), Some(2)]);
        assert!(!state.is_registered(1));
    }

    #[test]
    fn test_alert_patches_matching_transaction_in_place() {
        let mut state = MonitorState::new(5, 5);
        state.apply(StreamEvent::Transaction(tx(7, "user-201", 15000.0)));
        state.apply(StreamEvent::Alert(alert_for(
            tx(7, "user-201", 15000.0),
            "High Value Transaction",
        )));

        let txs = state.transactions();
        assert_eq!(txs.len(), 1);
        assert!(txs[0].is_fraud);
        assert_eq!(txs[0].amount, 15000.0);
        assert_eq!(txs[0].user_id, "user-201");
        assert_eq!(state.alert_count(), 1);
    }

    #[test]
    fn test_alert_redelivery_is_idempotent_on_transactions() {
        let mut state = MonitorState::new(5, 5);
        state.apply(StreamEvent::Transaction(tx(7, "u1", 100.0)));
        let alert = alert_for(tx(7, "u1", 100.0), "Velocity Check");
        state.apply(StreamEvent::Alert(alert.clone()));
        let after_first = state.transactions();
        state.apply(StreamEvent::Alert(alert));
        let after_second = state.transactions();

        assert_eq!(after_first.len(), after_second.len());
        assert!(after_second[0].is_fraud);
        assert_eq!(state.transaction_count(), 1);
    }

    #[test]
    fn test_alert_before_transaction_synthesizes_fraud_entry() {
        let mut state = MonitorState::new(5, 5);
        state.apply(StreamEvent::Alert(alert_for(
            tx(99, "u9", 5000.0),
            "Amount Pattern",
        )));

        let txs = state.transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, Some(99));
        assert!(txs[0].is_fraud);
        assert!(state.is_registered(99));
    }

    #[test]
    fn test_evicted_transaction_alert_reinserts_snapshot() {
        // Capacity 2: insert A, B, C, then an alert for the evicted A.
        // Buffer ends as [A(fraud), C]; registry {A, C}.
        let mut state = MonitorState::new(2, 2);
        state.apply(StreamEvent::Transaction(tx(1, "a", 1.0))); // A
        state.apply(StreamEvent::Transaction(tx(2, "b", 2.0))); // B
        state.apply(StreamEvent::Transaction(tx(3, "c", 3.0))); // C, evicts A
        assert!(!state.is_registered(1));

        state.apply(StreamEvent::Alert(alert_for(tx(1, "a", 1.0), "Velocity")));

        let ids: Vec<Option<i64>> = state.transactions().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(1), Some(3)]);
        assert!(state.transactions()[0].is_fraud);
        assert_eq!(state.registered_ids(), HashSet::from([1, 3]));
    }

    #[test]
    fn test_transaction_after_synthesizing_alert_keeps_verdict() {
        // Out-of-order redelivery: the alert for T arrives first and
        // synthesizes a fraud-marked entry, then T's own new_transaction
        // event lands. It must merge, not duplicate, and the verdict stays.
        let mut state = MonitorState::new(5, 5);
        state.apply(StreamEvent::Alert(alert_for(
            tx(99, "u9", 250.0),
            "Geographic Inconsistency",
        )));
        state.apply(StreamEvent::Transaction(tx(99, "u9", 250.0)));

        let copies = state
            .transactions()
            .iter()
            .filter(|t| t.id == Some(99))
            .count();
        assert_eq!(copies, 1);
        assert!(state.transactions()[0].is_fraud);
        assert_eq!(state.registered_ids(), buffered_ids(&state));
    }

    #[test]
    fn test_duplicate_id_never_desyncs_registry_under_eviction() {
        let mut state = MonitorState::new(2, 2);
        state.apply(StreamEvent::Alert(alert_for(tx(99, "u9", 250.0), "Velocity")));
        state.apply(StreamEvent::Transaction(tx(99, "u9", 250.0)));
        state.apply(StreamEvent::Transaction(tx(7, "u7", 10.0)));
        // Push the buffer over capacity: id 99 must leave exactly once,
        // with its registry entry going with it.
        state.apply(StreamEvent::Transaction(tx(8, "u8", 20.0)));

        assert_eq!(state.registered_ids(), buffered_ids(&state));
        assert!(!state.is_registered(99));

        // A later alert for a still-buffered id patches, never re-inserts.
        state.apply(StreamEvent::Alert(alert_for(tx(7, "u7", 10.0), "Velocity")));
        let copies = state
            .transactions()
            .iter()
            .filter(|t| t.id == Some(7))
            .count();
        assert_eq!(copies, 1);
        assert!(state
            .transactions()
            .iter()
            .find(|t| t.id == Some(7))
            .unwrap()
            .is_fraud);
    }

    #[test]
    fn test_merge_never_clears_existing_fraud_flag() {
        // A redelivered clean copy of an already-marked transaction must not
        // flip the flag back.
        let mut state = MonitorState::new(5, 5);
        state.apply(StreamEvent::Transaction(tx(3, "u3", 40.0)));
        state.apply(StreamEvent::Alert(alert_for(tx(3, "u3", 40.0), "Z-Score")));
        assert!(state.transactions()[0].is_fraud);

        state.apply(StreamEvent::Transaction(tx(3, "u3", 40.0)));
        assert_eq!(state.transaction_count(), 1);
        assert!(state.transactions()[0].is_fraud);
    }

    #[test]
    fn test_flat_alert_touches_only_alert_buffer() {
        let mut state = MonitorState::new(3, 3);
        state.apply(StreamEvent::Transaction(tx(1, "u1", 10.0)));
        state.apply(StreamEvent::Alert(FraudAlert {
            id: None,
            rule_name: None,
            details: Some("suspicious".to_string()),
            user_id: Some("u1".to_string()),
            amount: Some(10.0),
            status: Some("active".to_string()),
            timestamp: None,
            transaction: None,
        }));

        assert_eq!(state.alert_count(), 1);
        assert_eq!(state.transaction_count(), 1);
        assert!(!state.transactions()[0].is_fraud);
    }

    #[test]
    fn test_alert_buffer_eviction_leaves_registry_alone() {
        let mut state = MonitorState::new(5, 2);
        state.apply(StreamEvent::Transaction(tx(1, "u1", 10.0)));
        for i in 0..4 {
            state.apply(StreamEvent::Alert(FraudAlert {
                id: Some(format!("a{i}")),
                rule_name: Some("rule".to_string()),
                details: None,
                user_id: None,
                amount: None,
                status: None,
                timestamp: None,
                transaction: None,
            }));
        }
        assert_eq!(state.alert_count(), 2);
        assert!(state.is_registered(1));
    }

    #[test]
    fn test_clear_highlight_flips_only_is_new() {
        let mut state = MonitorState::new(3, 3);
        let mut t = tx(5, "u1", 20.0);
        t.is_new = true;
        t.is_fraud = true;
        state.apply(StreamEvent::Transaction(t));

        state.clear_highlight(5);
        let txs = state.transactions();
        assert!(!txs[0].is_new);
        assert!(txs[0].is_fraud);
        assert_eq!(txs[0].id, Some(5));

        // Clearing an unknown id is a no-op.
        state.clear_highlight(404);
    }

    #[test]
    fn test_seed_replays_newest_first_snapshot() {
        let mut state = MonitorState::new(2, 2);
        // Snapshot endpoints return newest-first: [3, 2, 1].
        state.seed(
            vec![tx(3, "c", 3.0), tx(2, "b", 2.0), tx(1, "a", 1.0)],
            vec![],
        );
        let ids: Vec<Option<i64>> = state.transactions().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(3), Some(2)]);
        assert!(!state.is_registered(1));
    }
}
