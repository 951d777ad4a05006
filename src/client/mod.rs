//! Client-side proxy.
//!
//! This module contains the core [`ClientProxy`] type which runs inside
//! a satellite process: it calls the host, answers host-originated
//! calls, and reaches peer clients through the host's relay.
//!
//! # Architecture
//!
//! The proxy owns the client's single channel to the host and runs a
//! background receive loop over its inbox. Each outgoing call generates
//! a unique call ID and registers a oneshot waiter in the pending map
//! strictly before the request frame is sent; the receive loop matches
//! incoming replies back to their waiters. Incoming requests spawn one
//! task each, so a slow handler never blocks the channel.
//!
//! # Concurrency
//!
//! Multiple calls can be in flight simultaneously, including on the
//! same topic. The pending map is protected by a mutex but lock
//! contention is minimal since operations are just HashMap
//! insert/remove.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time;

use crate::handlers::{self, HandlerMode, HandlerRegistry};
use crate::pending::PendingCalls;
use crate::protocol::{encode_payload, Frame, ReplyResult};
use crate::{BrokerConfig, CallId, ChannelPtr, ClientId, Endpoint, Error, Result};

/// Running client proxy instance.
///
/// Cheap to clone (internally `Arc`-backed). Dropping the last handle
/// ends the receive loop and closes the channel to the host.
#[derive(Clone)]
pub struct ClientProxy {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    // ---
    channel: ChannelPtr,
    config: BrokerConfig,
    pending: PendingCalls,

    /// Handlers for host-originated requests.
    host_handlers: HandlerRegistry,
    /// Handlers for calls relayed from peer clients.
    peer_handlers: HandlerRegistry,

    /// Best-effort receive loop handle.
    ///
    /// We keep it so the task isn't immediately dropped, and so it can
    /// be extended later (shutdown, join-on-close, etc.).
    _rx_task: tokio::task::JoinHandle<()>,
}

impl ClientProxy {
    // ---

    /// Create a proxy over this process's channel to the host.
    ///
    /// Takes over both halves of the endpoint and spawns the receive
    /// loop. The host defers calls to this client until [`ready`]
    /// is sent, so the usual startup order is: construct the proxy,
    /// register handlers, then call [`ready`].
    ///
    /// Must be called within a tokio runtime.
    ///
    /// [`ready`]: Self::ready
    pub fn new(endpoint: Endpoint, config: BrokerConfig) -> Self {
        // ---
        let Endpoint { channel, inbox } = endpoint;
        let channel_for_inner = channel.clone();
        let mut frames = inbox.frames;

        // The receive loop needs to call back into the proxy, so the
        // Arc is built cyclically around the spawned task's weak handle.
        let inner = Arc::new_cyclic(|weak| {
            // ---
            let weak = weak.clone();

            let rx_task = tokio::spawn(async move {
                // ---
                loop {
                    match frames.recv().await {
                        Some(frame) => {
                            let Some(inner) = weak.upgrade() else { break };
                            let proxy = ClientProxy { inner };
                            proxy.dispatch_frame(frame);
                        }
                        None => {
                            crate::log_debug!("host channel closed");
                            break;
                        }
                    }
                }
            });

            ClientInner {
                // ---
                channel: channel_for_inner,
                config,
                pending: PendingCalls::new(),
                host_handlers: HandlerRegistry::new(),
                peer_handlers: HandlerRegistry::new(),
                _rx_task: rx_task,
            }
        });

        Self { inner }
    }

    /// Signal the host that this client finished initializing.
    ///
    /// Releases host-side sends deferred behind the readiness gate.
    /// Call it after registering handlers, once per process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the host channel is gone.
    pub async fn ready(&self) -> Result<()> {
        // ---
        self.inner.channel.send(Frame::Ready).await
    }

    /// Call the host and await its reply. Uses the configured
    /// `call_timeout`.
    ///
    /// Resolves with exactly the value the host handler returned for
    /// these arguments. Pass a tuple for an ordered argument sequence.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] - no reply within the timeout
    /// - [`Error::Handler`] - the host handler failed or was missing
    /// - [`Error::ChannelClosed`] - the host channel closed mid-call
    /// - [`Error::Serialization`] - request or reply failed to (de)serialize
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use hub_rpc::{BrokerConfig, ClientProxy, memory_pair};
    /// # async fn example() -> hub_rpc::Result<()> {
    /// # let (_host_side, client_side) = memory_pair(16);
    /// let proxy = ClientProxy::new(client_side, BrokerConfig::new());
    /// let answer: i64 = proxy.call_host("ping", 42).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call_host<TReq, TResp>(&self, topic: &str, req: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        self.call_host_with_timeout(topic, req, self.inner.config.call_timeout)
            .await
    }

    /// Call the host with a custom timeout for this single call.
    ///
    /// # Errors
    ///
    /// Same as [`call_host`](Self::call_host).
    pub async fn call_host_with_timeout<TReq, TResp>(
        &self,
        topic: &str,
        req: TReq,
        timeout: Duration,
    ) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let call_id = CallId::generate();
        let frame = Frame::Request {
            topic: topic.to_owned(),
            call_id,
            broadcast: false,
            args: encode_payload(&req)?,
        };

        self.call_raw(call_id, frame, timeout).await
    }

    /// Call every peer client through the host relay and resolve with
    /// the first reply from any of them.
    ///
    /// The host forwards the call to every attached client (this one
    /// included) and routes the earliest reply back here. Peers without
    /// a handler for the topic stay silent.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] - no peer replied within `call_timeout`
    /// - [`Error::Handler`] - the winning reply was a handler failure
    /// - [`Error::ChannelClosed`] - the host channel closed mid-call
    pub async fn call_peer<TReq, TResp>(&self, topic: &str, req: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        self.relay_call(None, topic, req).await
    }

    /// Call one specific peer client through the host relay.
    ///
    /// # Errors
    ///
    /// - [`Error::Handler`] - the target is unknown to the host, or its
    ///   handler failed
    /// - [`Error::Timeout`] - no reply within `call_timeout`
    /// - [`Error::ChannelClosed`] - the host channel closed mid-call
    pub async fn call_peer_to<TReq, TResp>(
        &self,
        target: ClientId,
        topic: &str,
        req: TReq,
    ) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        self.relay_call(Some(target), topic, req).await
    }

    /// Register a persistent handler for host-originated calls.
    ///
    /// The handler's return value (or failure) is sent back to the host
    /// tagged with the request's call ID. A later registration on the
    /// same topic replaces the earlier one.
    pub fn handle_host<TReq, TResp, F, Fut>(&self, topic: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        self.inner
            .host_handlers
            .register(topic, HandlerMode::Persistent, handler);
    }

    /// Register a one-shot handler for host-originated calls.
    ///
    /// The registration removes itself before its first invocation
    /// runs; a second request on the topic finds no handler. Useful for
    /// single-use negotiations such as handshake topics.
    pub fn handle_host_once<TReq, TResp, F, Fut>(&self, topic: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        self.inner
            .host_handlers
            .register(topic, HandlerMode::OneShot, handler);
    }

    /// Register a persistent handler for calls relayed from peers.
    ///
    /// The result travels back through the host, which routes it to the
    /// originating peer.
    pub fn handle_peer<TReq, TResp, F, Fut>(&self, topic: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        self.inner
            .peer_handlers
            .register(topic, HandlerMode::Persistent, handler);
    }

    /// Register a one-shot handler for calls relayed from peers.
    pub fn handle_peer_once<TReq, TResp, F, Fut>(&self, topic: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        self.inner
            .peer_handlers
            .register(topic, HandlerMode::OneShot, handler);
    }

    /// Shared relay-leg implementation for peer calls.
    async fn relay_call<TReq, TResp>(
        &self,
        target: Option<ClientId>,
        topic: &str,
        req: TReq,
    ) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let call_id = CallId::generate();
        let frame = Frame::Relay {
            target,
            topic: topic.to_owned(),
            call_id,
            args: encode_payload(&req)?,
        };

        self.call_raw(call_id, frame, self.inner.config.call_timeout)
            .await
    }

    /// Register the waiter, transmit, await the reply envelope.
    ///
    /// The waiter is installed strictly before transmission so a reply
    /// cannot race past it no matter how fast the peer answers.
    async fn call_raw<TResp>(&self, call_id: CallId, frame: Frame, timeout: Duration) -> Result<TResp>
    where
        TResp: DeserializeOwned,
    {
        // ---
        let rx = self.inner.pending.register(call_id);

        let exchange = async {
            // ---
            self.inner.channel.send(frame).await?;

            match rx.await {
                Ok(result) => crate::protocol::decode_reply(result),
                Err(_) => Err(Error::ChannelClosed),
            }
        };

        let out = match time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };

        if out.is_err() {
            self.inner.pending.remove(call_id);
        }
        out
    }

    /// Route one incoming frame from the host channel.
    fn dispatch_frame(&self, frame: Frame) {
        // ---
        match frame {
            Frame::Reply { call_id, result } => {
                // ---
                if !self.inner.pending.complete(call_id, result) {
                    crate::log_debug!("no pending call for {call_id}");
                }
            }

            Frame::Request {
                topic,
                call_id,
                broadcast,
                args,
            } => {
                // ---
                let handler = self.inner.host_handlers.acquire(&topic);
                let channel = self.inner.channel.clone();

                tokio::spawn(async move {
                    // ---
                    let result = match handler {
                        Some(handler) => handlers::run(handler, args).await,
                        None if broadcast => {
                            // Stay out of the fan-out race; some other
                            // client owns this topic.
                            crate::log_debug!("ignoring broadcast for unhandled topic: {topic}");
                            return;
                        }
                        None => ReplyResult::Err(format!("no handler for topic: {topic}")),
                    };

                    if let Err(_err) = channel.send(Frame::Reply { call_id, result }).await {
                        crate::log_debug!("reply for {call_id} failed: {_err}");
                    }
                });
            }

            Frame::Relayed {
                topic,
                call_id,
                args,
            } => {
                // ---
                // Relays are fan-out by default; a client without the
                // handler stays mute so its absence cannot outrun the
                // peer that actually owns the topic.
                let Some(handler) = self.inner.peer_handlers.acquire(&topic) else {
                    crate::log_debug!("ignoring relay for unhandled topic: {topic}");
                    return;
                };
                let channel = self.inner.channel.clone();

                tokio::spawn(async move {
                    // ---
                    let result = handlers::run(handler, args).await;

                    if let Err(_err) = channel.send(Frame::RelayReply { call_id, result }).await {
                        crate::log_debug!("relay reply for {call_id} failed: {_err}");
                    }
                });
            }

            Frame::Ready | Frame::Relay { .. } | Frame::RelayReply { .. } => {
                // ---
                crate::log_warn!("unexpected client-bound frame");
            }
        }
    }
}
