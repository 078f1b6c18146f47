//! Transaction table
//!
//! In-flight request bookkeeping, touched only by the listener task. One
//! entry per request key; the entry tracks which worker owns the request
//! and whether the reply has been sent. Reverse scans by worker identity
//! only happen on abnormal worker exit.

use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::mpsc;

/// Identity of a handler worker task within one server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

/// Key identifying a request within the retention window:
/// source IP, source port, and the 1-byte RADIUS identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub nas_ip: IpAddr,
    pub nas_port: u16,
    pub request_id: u8,
}

impl RequestKey {
    pub fn new(nas_ip: IpAddr, nas_port: u16, request_id: u8) -> Self {
        RequestKey {
            nas_ip,
            nas_port,
            request_id,
        }
    }
}

/// Transaction state as seen by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// The worker is still producing the reply
    Handling,
    /// The reply was sent; the worker retains it for retransmission
    Replied,
}

/// One in-flight transaction
pub struct Transaction {
    pub state: TransactionState,
    pub worker: WorkerId,
    /// Wakes the retaining worker to resend the cached reply. Bounded to the
    /// retry budget; overflow means the budget is already spent.
    pub resend_tx: mpsc::Sender<()>,
}

/// Map of in-flight transactions, owned by the listener
#[derive(Default)]
pub struct TransactionTable {
    entries: HashMap<RequestKey, Transaction>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `Handling` entry. The caller checks for duplicates
    /// first; at most one entry per key ever exists.
    pub fn insert_handling(&mut self, key: RequestKey, worker: WorkerId, resend_tx: mpsc::Sender<()>) {
        self.entries.insert(
            key,
            Transaction {
                state: TransactionState::Handling,
                worker,
                resend_tx,
            },
        );
    }

    pub fn get(&self, key: &RequestKey) -> Option<&Transaction> {
        self.entries.get(key)
    }

    /// Transition an entry to `Replied`. A missing entry is ignored: the
    /// worker may already have been purged after an abnormal exit.
    pub fn mark_replied(&mut self, key: &RequestKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = TransactionState::Replied;
        }
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<Transaction> {
        self.entries.remove(key)
    }

    /// Drop every entry owned by `worker`, regardless of key.
    /// Returns the number of purged entries.
    pub fn purge_worker(&mut self, worker: WorkerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, tx| tx.worker != worker);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u8) -> RequestKey {
        RequestKey::new("192.168.1.1".parse().unwrap(), 50000, id)
    }

    fn resend_tx() -> mpsc::Sender<()> {
        mpsc::channel(3).0
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = TransactionTable::new();
        table.insert_handling(key(7), WorkerId(1), resend_tx());

        let entry = table.get(&key(7)).unwrap();
        assert_eq!(entry.state, TransactionState::Handling);
        assert_eq!(entry.worker, WorkerId(1));
        assert!(table.get(&key(8)).is_none());
    }

    #[test]
    fn test_distinct_ports_are_distinct_keys() {
        let mut table = TransactionTable::new();
        let a = RequestKey::new("192.168.1.1".parse().unwrap(), 50000, 7);
        let b = RequestKey::new("192.168.1.1".parse().unwrap(), 50001, 7);

        table.insert_handling(a, WorkerId(1), resend_tx());
        table.insert_handling(b, WorkerId(2), resend_tx());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_mark_replied() {
        let mut table = TransactionTable::new();
        table.insert_handling(key(7), WorkerId(1), resend_tx());
        table.mark_replied(&key(7));

        assert_eq!(table.get(&key(7)).unwrap().state, TransactionState::Replied);

        // Marking a removed entry is a no-op
        table.remove(&key(7));
        table.mark_replied(&key(7));
        assert!(table.get(&key(7)).is_none());
    }

    #[test]
    fn test_remove() {
        let mut table = TransactionTable::new();
        table.insert_handling(key(7), WorkerId(1), resend_tx());

        assert!(table.remove(&key(7)).is_some());
        assert!(table.remove(&key(7)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_purge_worker() {
        let mut table = TransactionTable::new();
        table.insert_handling(key(1), WorkerId(1), resend_tx());
        table.insert_handling(key(2), WorkerId(2), resend_tx());
        table.insert_handling(key(3), WorkerId(1), resend_tx());

        assert_eq!(table.purge_worker(WorkerId(1)), 2);
        assert_eq!(table.len(), 1);
        assert!(table.get(&key(2)).is_some());

        assert_eq!(table.purge_worker(WorkerId(9)), 0);
    }
}
