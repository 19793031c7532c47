//! Pending call registry.
//!
//! Maps a call identifier to the one-shot channel its caller waits on. The
//! receive task and every in-flight call touch this map, so each compound
//! operation (check-then-insert, find-then-remove) runs under a single lock.

use crate::error::ClientError;
use muxrpc_protocol::ResponseFrame;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Inner {
    waiters: HashMap<u64, oneshot::Sender<ResponseFrame>>,
    closed: bool,
}

/// Shared map of outstanding calls.
#[derive(Debug, Default)]
pub struct PendingCalls {
    inner: Mutex<Inner>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id`.
    ///
    /// The returned [`PendingCall`] removes its entry when dropped, so a call
    /// that times out or is abandoned never leaves a slot behind.
    pub fn register(&self, id: u64) -> Result<PendingCall<'_>, ClientError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ClientError::ConnectionClosed);
        }
        if inner.waiters.contains_key(&id) {
            return Err(ClientError::DuplicateCallId(id));
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.insert(id, tx);
        tracing::trace!("registered call id={} ({} pending)", id, inner.waiters.len());

        Ok(PendingCall {
            id,
            rx,
            registry: self,
        })
    }

    /// Finds and removes the waiter for `id` in one step.
    pub fn take(&self, id: u64) -> Option<oneshot::Sender<ResponseFrame>> {
        self.inner.lock().waiters.remove(&id)
    }

    /// Removes the waiter for `id`, if still registered.
    pub fn remove(&self, id: u64) -> bool {
        self.inner.lock().waiters.remove(&id).is_some()
    }

    /// Closes the registry and fails every outstanding call.
    ///
    /// Dropping the senders wakes each waiter with a closed channel. Later
    /// registrations are refused. Returns the number of calls failed.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.waiters.drain().collect()
        };
        drained.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered call waiting for its response.
#[derive(Debug)]
pub struct PendingCall<'a> {
    id: u64,
    rx: oneshot::Receiver<ResponseFrame>,
    registry: &'a PendingCalls,
}

impl PendingCall<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the response to be delivered.
    ///
    /// Fails with `ConnectionClosed` if the registry was closed, or the entry
    /// removed, before a response arrived.
    pub async fn wait(&mut self) -> Result<ResponseFrame, ClientError> {
        (&mut self.rx)
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            tracing::trace!("call id={} abandoned, entry removed", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_register_then_deliver() {
        let registry = PendingCalls::new();
        let mut call = assert_ok!(registry.register(1));
        assert_eq!(registry.len(), 1);

        let tx = registry.take(1).unwrap();
        assert!(registry.is_empty());
        tx.send(ResponseFrame::ok(1, Bytes::from_static(b"42")))
            .unwrap();

        let response = assert_ok!(call.wait().await);
        assert_eq!(response.result.as_ref(), b"42");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = PendingCalls::new();
        let _first = registry.register(7).unwrap();

        let second = registry.register(7);
        assert!(matches!(second, Err(ClientError::DuplicateCallId(7))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_take_is_single_use() {
        let registry = PendingCalls::new();
        let _call = registry.register(3).unwrap();

        assert!(registry.take(3).is_some());
        assert!(registry.take(3).is_none());
        assert!(registry.take(99).is_none());
    }

    #[test]
    fn test_drop_removes_entry() {
        let registry = PendingCalls::new();
        {
            let _call = registry.register(5).unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_fails_waiters_and_refuses_new_calls() {
        let registry = PendingCalls::new();
        let mut a = registry.register(1).unwrap();
        let mut b = registry.register(2).unwrap();

        assert_eq!(registry.close(), 2);
        assert!(registry.is_closed());
        assert!(registry.is_empty());

        assert!(matches!(
            assert_err!(a.wait().await),
            ClientError::ConnectionClosed
        ));
        assert!(matches!(
            assert_err!(b.wait().await),
            ClientError::ConnectionClosed
        ));
        assert!(matches!(
            registry.register(3),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_concurrent_register_and_take() {
        use std::sync::Arc;

        let registry = Arc::new(PendingCalls::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let id = t * 10_000 + i;
                        let call = registry.register(id).unwrap();
                        assert!(registry.take(id).is_some());
                        drop(call);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
