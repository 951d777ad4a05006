// src/host/readiness.rs

//! Send deferral for clients that are still initializing.
//!
//! A freshly attached client may not have registered its handlers yet;
//! a frame sent before then would be consumed by nothing. Each attached
//! client therefore carries a readiness flag, flipped by its `Ready`
//! frame, and client-bound calls wait behind it.

use tokio::sync::watch;

use crate::{Error, Result};

/// Per-client readiness flag.
///
/// Starts not-ready; `mark_ready()` flips it exactly once (later calls
/// are no-ops). Dropping the gate (client detach) wakes waiters with an
/// error.
pub(crate) struct ReadinessGate {
    // ---
    tx: watch::Sender<bool>,
}

impl ReadinessGate {
    // ---

    pub fn new() -> Self {
        // ---
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn mark_ready(&self) {
        // ---
        let _ = self.tx.send(true);
    }

    /// Obtain a waiter handle usable outside the registry lock.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        // ---
        self.tx.subscribe()
    }
}

/// Resolve once the client behind `rx` reports ready.
///
/// Already-ready resolves immediately. Otherwise this waits for the flag
/// to flip, then yields one scheduler tick before returning, so handler
/// registrations performed right after the readiness signal are in place
/// by the time the deferred send runs. There is no gate-level timeout:
/// if the client never reports ready, this never resolves and the
/// caller's per-call timeout is what unblocks the await. Fails with
/// `ChannelClosed` when the client detaches while being waited on.
pub(crate) async fn await_ready(mut rx: watch::Receiver<bool>) -> Result<()> {
    // ---
    if *rx.borrow() {
        return Ok(());
    }

    rx.wait_for(|ready| *ready)
        .await
        .map_err(|_| Error::ChannelClosed)?;

    tokio::task::yield_now().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_immediate_when_ready() {
        // ---
        let gate = ReadinessGate::new();
        gate.mark_ready();

        await_ready(gate.subscribe()).await.unwrap();
    }

    #[tokio::test]
    async fn test_defers_until_marked() {
        // ---
        let gate = ReadinessGate::new();
        let rx = gate.subscribe();

        let waiter = tokio::spawn(await_ready(rx));

        // Not resolved while the flag is down.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.mark_ready();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_detach_while_waiting() {
        // ---
        let gate = ReadinessGate::new();
        let rx = gate.subscribe();

        let waiter = tokio::spawn(await_ready(rx));
        drop(gate);

        assert!(matches!(waiter.await.unwrap(), Err(Error::ChannelClosed)));
    }
}
