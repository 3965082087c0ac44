//! Continuations waiting on host-mediated reads
//!
//! A suspended read is a `oneshot` receiver; resolving its handle's entry is
//! the only way to wake it.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::types::Handle;

/* ===================== Pending request table ===================== */

/// At most one outstanding read per handle.
#[derive(Debug)]
pub struct PendingRequestTable<T> {
    waiting: HashMap<Handle, oneshot::Sender<T>>,
}

impl<T> PendingRequestTable<T> {
    pub fn new() -> Self {
        Self {
            waiting: HashMap::new(),
        }
    }

    /// Register a continuation for `handle`.
    ///
    /// Fails with [`BridgeError::ReadInFlight`] while an earlier request on
    /// the same handle is still live. An entry whose reader has gone away
    /// (receiver dropped) does not count and is replaced.
    pub fn register(&mut self, handle: Handle) -> Result<oneshot::Receiver<T>> {
        if let Some(existing) = self.waiting.get(&handle) {
            if !existing.is_closed() {
                return Err(BridgeError::ReadInFlight(handle));
            }
        }

        let (tx, rx) = oneshot::channel();
        self.waiting.insert(handle, tx);
        Ok(rx)
    }

    /// Resolve the continuation for `handle`. Returns false (and logs) when
    /// no live request exists, in which case `value` is discarded.
    pub fn resolve(&mut self, handle: Handle, value: T) -> bool {
        match self.waiting.remove(&handle) {
            Some(tx) => {
                if tx.send(value).is_err() {
                    warn!(%handle, "reader went away before its response arrived");
                    return false;
                }
                true
            }
            None => {
                warn!(%handle, "discarding response with no pending request");
                false
            }
        }
    }

    /// Forget the request for `handle` without answering it.
    pub fn cancel(&mut self, handle: Handle) -> bool {
        self.waiting.remove(&handle).is_some()
    }

    pub fn is_pending(&self, handle: Handle) -> bool {
        self.waiting
            .get(&handle)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Drop every continuation; their readers observe a closed channel.
    pub fn clear(&mut self) {
        self.waiting.clear();
    }
}

impl<T> Default for PendingRequestTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Wait list ===================== */

/// Host-side queue of prompts waiting on the next person-supplied line.
///
/// One delivery resolves every waiter queued at that moment, in queue order.
#[derive(Debug)]
pub struct WaitList<T> {
    waiters: Vec<oneshot::Sender<T>>,
}

impl<T: Clone> WaitList<T> {
    pub fn new() -> Self {
        Self {
            waiters: Vec::new(),
        }
    }

    pub fn push(&mut self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// Resolve all current waiters with `value`; returns how many were woken.
    pub fn resolve_all(&mut self, value: T) -> usize {
        let mut woken = 0;
        for tx in self.waiters.drain(..) {
            if tx.send(value.clone()).is_ok() {
                woken += 1;
            }
        }
        woken
    }

    pub fn len(&self) -> usize {
        self.waiters.iter().filter(|tx| !tx.is_closed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for WaitList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_wakes_reader() {
        let mut table = PendingRequestTable::new();
        let rx = table.register(Handle(3)).unwrap();
        assert!(table.is_pending(Handle(3)));

        assert!(table.resolve(Handle(3), "abc".to_string()));
        assert_eq!(rx.await.unwrap(), "abc");
        assert!(!table.is_pending(Handle(3)));
    }

    #[test]
    fn test_second_request_on_same_handle_is_rejected() {
        let mut table: PendingRequestTable<String> = PendingRequestTable::new();
        let _rx = table.register(Handle(3)).unwrap();

        assert_eq!(
            table.register(Handle(3)).unwrap_err(),
            BridgeError::ReadInFlight(Handle(3))
        );
        // Other handles are independent
        assert!(table.register(Handle(4)).is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_abandoned_request_can_be_replaced() {
        let mut table: PendingRequestTable<u8> = PendingRequestTable::new();
        drop(table.register(Handle(1)).unwrap());
        assert!(!table.is_pending(Handle(1)));
        assert!(table.register(Handle(1)).is_ok());
    }

    #[test]
    fn test_response_without_request_is_discarded() {
        let mut table: PendingRequestTable<u8> = PendingRequestTable::new();
        assert!(!table.resolve(Handle(8), 1));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_clear_closes_readers() {
        let mut table: PendingRequestTable<u8> = PendingRequestTable::new();
        let rx = table.register(Handle(1)).unwrap();
        table.clear();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_wait_list_resolves_everyone_once() {
        let mut list = WaitList::new();
        let first = list.push();
        let second = list.push();
        assert_eq!(list.len(), 2);

        assert_eq!(list.resolve_all("yes".to_string()), 2);
        assert_eq!(first.await.unwrap(), "yes");
        assert_eq!(second.await.unwrap(), "yes");
        assert!(list.is_empty());
        assert_eq!(list.resolve_all("again".to_string()), 0);
    }
}
