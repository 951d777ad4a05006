// src/domain/channel.rs

//! Channel domain abstractions.
//!
//! This module defines the domain-level channel interface used by the
//! host and client layers to exchange frames. It intentionally avoids
//! any reference to concrete transports.
//!
//! A channel is one side of a dedicated, bidirectional host↔client pair:
//! unlike a pub/sub topic space there is exactly one peer, so the
//! interface is a send half plus a receive half rather than
//! publish/subscribe. The channel layer is responsible only for
//! delivering opaque frames in order; correlation, readiness deferral,
//! and relay routing are handled above it.
//!
//! Concrete implementations live under `src/transport/`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::protocol::Frame;
use crate::Result;

/// Identity the host assigns to a client process at attach time.
///
/// Used only for unicast targeting (direct calls and targeted relays),
/// never for ownership. Opaque to clients; the host hands it out from
/// [`HostBroker::attach`](crate::HostBroker::attach) and applications
/// distribute it to clients however they see fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub(crate) u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Receive half of a channel.
///
/// Frames arrive in the order the peer sent them. The stream ends when
/// the peer's send half closes.
pub struct Inbox {
    // ---
    /// Receiver for frames delivered by the peer.
    pub frames: mpsc::Receiver<Frame>,
}

/// Send half of a channel.
///
/// Implementations must ensure that:
/// - Frames sent on one side arrive, in order, at the peer's [`Inbox`].
/// - `send()` fails with [`Error::ChannelClosed`](crate::Error::ChannelClosed)
///   once either the channel was closed or the peer's inbox was dropped.
///
/// The in-memory transport serves as the reference implementation of
/// these semantics.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    // ---
    /// Deliver a frame to the peer.
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Close the send half. Subsequent sends fail; the peer's inbox
    /// drains buffered frames and then ends.
    async fn close(&self) -> Result<()>;
}

/// Shared channel pointer.
///
/// An `Arc<dyn Channel>`: `.clone()` is cheap and clones share the same
/// underlying link. Used to erase concrete transport types behind a
/// stable domain interface.
pub type ChannelPtr = Arc<dyn Channel>;

/// One side of a duplex channel pair.
///
/// Handed to [`HostBroker::attach`](crate::HostBroker::attach) on the
/// host side or [`ClientProxy::new`](crate::ClientProxy::new) on the
/// client side, which take over both halves.
pub struct Endpoint {
    // ---
    /// Send half, toward the peer.
    pub channel: ChannelPtr,
    /// Receive half, from the peer.
    pub inbox: Inbox,
}
