// src/transport/memory.rs

//! In-memory duplex channel pair.
//!
//! This file contains the concrete implementation of the domain-level
//! `Channel` trait using in-process data structures only.
//!
//! The memory pair is the **reference implementation** of channel
//! semantics. Other transports are expected to approximate this behavior
//! as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! ## Semantics
//!
//! - Frames sent on one endpoint arrive, in order, at the other
//!   endpoint's inbox.
//! - `send()` fails with `ChannelClosed` once this side was closed or
//!   the peer's inbox was dropped.
//! - `close()` ends the outbound direction; the peer's inbox drains
//!   buffered frames and then ends.
//!
//! ## Non-Goals
//!
//! - Persistence or durability
//! - Network behavior or failure simulation

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::pending::lock_ignore_poison;
use crate::protocol::Frame;
use crate::{Channel, Endpoint, Error, Inbox, Result};

struct MemoryChannel {
    // ---
    /// Outbound sender; `None` after close.
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
    // ---

    async fn send(&self, frame: Frame) -> Result<()> {
        // ---
        let tx = lock_ignore_poison(&self.tx)
            .as_ref()
            .cloned()
            .ok_or(Error::ChannelClosed)?;

        tx.send(frame).await.map_err(|_| Error::ChannelClosed)
    }

    async fn close(&self) -> Result<()> {
        // ---
        lock_ignore_poison(&self.tx).take();
        Ok(())
    }
}

/// Create a linked pair of in-memory endpoints.
///
/// Frames sent on either endpoint's channel are delivered, in order, to
/// the other endpoint's inbox. `capacity` bounds the frames buffered per
/// direction; a send against a full buffer waits for the peer to drain.
///
/// # Example
///
/// ```
/// # use hub_rpc::memory_pair;
/// let (host_side, client_side) = memory_pair(16);
/// ```
pub fn pair(capacity: usize) -> (Endpoint, Endpoint) {
    // ---
    let (left_tx, right_rx) = mpsc::channel(capacity);
    let (right_tx, left_rx) = mpsc::channel(capacity);

    let left = Endpoint {
        channel: Arc::new(MemoryChannel {
            tx: Mutex::new(Some(left_tx)),
        }),
        inbox: Inbox { frames: left_rx },
    };

    let right = Endpoint {
        channel: Arc::new(MemoryChannel {
            tx: Mutex::new(Some(right_tx)),
        }),
        inbox: Inbox { frames: right_rx },
    };

    (left, right)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        // ---
        let (left, mut right) = pair(8);

        left.channel.send(Frame::Ready).await.unwrap();
        left.channel
            .send(Frame::Reply {
                call_id: crate::CallId::generate(),
                result: crate::ReplyResult::Err("x".to_owned()),
            })
            .await
            .unwrap();

        assert!(matches!(right.inbox.frames.recv().await, Some(Frame::Ready)));
        assert!(matches!(
            right.inbox.frames.recv().await,
            Some(Frame::Reply { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        // ---
        let (left, _right) = pair(8);

        left.channel.close().await.unwrap();

        assert!(matches!(
            left.channel.send(Frame::Ready).await,
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_ends_peer_inbox() {
        // ---
        let (left, mut right) = pair(8);

        left.channel.send(Frame::Ready).await.unwrap();
        left.channel.close().await.unwrap();

        // Buffered frame still drains, then the stream ends.
        assert!(matches!(right.inbox.frames.recv().await, Some(Frame::Ready)));
        assert!(right.inbox.frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_fails_when_inbox_dropped() {
        // ---
        let (left, right) = pair(8);

        drop(right.inbox);

        assert!(matches!(
            left.channel.send(Frame::Ready).await,
            Err(Error::ChannelClosed)
        ));
    }
}
