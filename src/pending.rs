//! Pending call tracking.
//!
//! Each in-flight call registers a oneshot waiter keyed by its
//! [`CallId`] before the request frame is transmitted, so a reply cannot
//! race past its waiter no matter how fast the peer answers. The waiter
//! is consumed by the first matching reply; timed-out calls remove their
//! entry explicitly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::protocol::ReplyResult;
use crate::CallId;

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// Mutex poisoning indicates that another task panicked while holding the
/// lock. The state protected this way in this crate is best-effort
/// bookkeeping (pending waiters, relay routes) with no invariants
/// spanning multiple fields; the worst outcome of continuing is a dropped
/// or unmatched reply. This also avoids propagating non-`Send` poison
/// errors across async boundaries.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Tracks calls waiting for replies.
///
/// Maps call IDs to oneshot channels. When a reply arrives, the channel
/// delivers the reply envelope to the waiting future.
pub(crate) struct PendingCalls {
    // ---
    calls: Mutex<HashMap<CallId, oneshot::Sender<ReplyResult>>>,
}

impl PendingCalls {
    // ---

    /// Create a new empty pending call tracker.
    pub fn new() -> Self {
        // ---
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new pending call.
    ///
    /// Returns a receiver that resolves when the reply arrives. Must be
    /// called before the request frame is sent.
    pub fn register(&self, call_id: CallId) -> oneshot::Receiver<ReplyResult> {
        // ---
        let (tx, rx) = oneshot::channel();
        lock_ignore_poison(&self.calls).insert(call_id, tx);
        rx
    }

    /// Complete a pending call with the reply envelope.
    ///
    /// Returns true if the call ID was found and the reply was delivered.
    pub fn complete(&self, call_id: CallId, result: ReplyResult) -> bool {
        // ---
        let tx = lock_ignore_poison(&self.calls).remove(&call_id);

        if let Some(tx) = tx {
            // Ignore if receiver dropped due to timeout.
            let _ = tx.send(result);
            true
        } else {
            false
        }
    }

    /// Remove a pending call without delivering a reply.
    ///
    /// Used for timeout cleanup.
    pub fn remove(&self, call_id: CallId) -> bool {
        // ---
        lock_ignore_poison(&self.calls).remove(&call_id).is_some()
    }

    /// Get the number of pending calls.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        // ---
        lock_ignore_poison(&self.calls).len()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_register_and_complete() {
        // ---
        let pending = PendingCalls::new();
        let call_id = CallId::generate();

        let rx = pending.register(call_id);
        assert_eq!(pending.len(), 1);

        let result = ReplyResult::Ok(Bytes::from("test reply"));
        assert!(pending.complete(call_id, result));

        // Should be removed after completion
        assert_eq!(pending.len(), 0);

        // Receiver should get the reply
        match rx.blocking_recv().unwrap() {
            ReplyResult::Ok(bytes) => assert_eq!(bytes, Bytes::from("test reply")),
            ReplyResult::Err(msg) => panic!("unexpected error reply: {msg}"),
        }
    }

    #[test]
    fn test_remove() {
        // ---
        let pending = PendingCalls::new();
        let call_id = CallId::generate();

        let _rx = pending.register(call_id);
        assert_eq!(pending.len(), 1);

        assert!(pending.remove(call_id));
        assert_eq!(pending.len(), 0);

        // Second remove should return false
        assert!(!pending.remove(call_id));
    }

    #[test]
    fn test_complete_unknown_id() {
        // ---
        let pending = PendingCalls::new();
        let call_id = CallId::generate();

        let result = ReplyResult::Ok(Bytes::from("test"));
        assert!(!pending.complete(call_id, result));
    }
}
