//! Host-side broker.
//!
//! The host is the single coordinating process every client connects
//! through. [`HostBroker`] owns the attached-client registry, dispatches
//! client-originated calls to registered handlers, issues calls to one
//! client, any client, or all clients, and routes the relay legs of
//! client-to-client calls.
//!
//! # Architecture
//!
//! `attach()` registers a client channel and spawns one receive loop per
//! client. Each incoming request spawns its own handler task so a slow
//! handler never blocks the channel. Outgoing calls register a pending
//! waiter keyed by call ID strictly before the request frame is sent,
//! and client-bound sends wait behind the client's readiness gate.
//!
//! Relayed calls never execute a handler on the host: the host forwards
//! the request leg, records who originated it, and unicasts the reply
//! leg back to that originator.

mod readiness;
mod registry;
mod relay;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time;

use readiness::await_ready;
use registry::ClientRegistry;
use relay::RelayTable;

use crate::handlers::{self, HandlerMode, HandlerRegistry};
use crate::pending::PendingCalls;
use crate::protocol::{decode_reply, encode_payload, Frame, ReplyResult};
use crate::{BrokerConfig, CallId, ClientId, Endpoint, Error, Result};

/// Running host broker instance.
///
/// Cheap to clone (internally `Arc`-backed). Dropping the last handle
/// ends the per-client receive loops.
#[derive(Clone)]
pub struct HostBroker {
    inner: Arc<HostInner>,
}

struct HostInner {
    // ---
    config: BrokerConfig,
    registry: ClientRegistry,
    relay: RelayTable,
    pending: PendingCalls,
    handlers: HandlerRegistry,
}

impl HostBroker {
    // ---

    /// Create a new host broker.
    pub fn new(config: BrokerConfig) -> Self {
        // ---
        Self {
            inner: Arc::new(HostInner {
                config,
                registry: ClientRegistry::new(),
                relay: RelayTable::new(),
                pending: PendingCalls::new(),
                handlers: HandlerRegistry::new(),
            }),
        }
    }

    /// Attach a client channel and assign its identity.
    ///
    /// Takes over both halves of the endpoint and spawns the client's
    /// receive loop. The client starts not-ready; calls to it defer
    /// until its [`ClientProxy::ready`](crate::ClientProxy::ready)
    /// signal arrives. Detach is implicit: when the channel closes, the
    /// registry entry is removed and waiters behind its readiness gate
    /// fail.
    ///
    /// Must be called within a tokio runtime.
    pub async fn attach(&self, endpoint: Endpoint) -> ClientId {
        // ---
        let Endpoint { channel, inbox } = endpoint;
        let id = self.inner.registry.insert(channel).await;
        crate::log_info!("client {id} attached");

        let weak = Arc::downgrade(&self.inner);
        let mut frames = inbox.frames;

        tokio::spawn(async move {
            // ---
            while let Some(frame) = frames.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                let broker = HostBroker { inner };
                broker.dispatch_frame(id, frame).await;
            }

            if let Some(inner) = weak.upgrade() {
                inner.registry.remove(id).await;
                crate::log_info!("client {id} detached");
            }
        });

        id
    }

    /// Identities of every currently attached client.
    pub async fn client_ids(&self) -> Vec<ClientId> {
        // ---
        self.inner.registry.ids().await
    }

    /// Register a handler for client-originated calls on a topic.
    ///
    /// The handler's return value (or failure) is sent back to the
    /// originating client's channel. A later registration on the same
    /// topic replaces the earlier one; registrations live for the
    /// process lifetime.
    pub fn handle_client<TReq, TResp, F, Fut>(&self, topic: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        self.inner
            .handlers
            .register(topic, HandlerMode::Persistent, handler);
    }

    /// Call one client and await its reply. Uses the configured
    /// `call_timeout`.
    ///
    /// The send defers until the client reports ready; a never-ready
    /// client surfaces as [`Error::Timeout`].
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownClient`] - no attached client has this identity
    /// - [`Error::Timeout`] - no reply within the timeout
    /// - [`Error::Handler`] - the client's handler failed or was missing
    /// - [`Error::ChannelClosed`] - the client detached mid-call
    pub async fn call_client<TReq, TResp>(
        &self,
        id: ClientId,
        topic: &str,
        req: TReq,
    ) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        self.call_client_with_timeout(id, topic, req, self.inner.config.call_timeout)
            .await
    }

    /// Call one client with a custom timeout for this single call.
    ///
    /// # Errors
    ///
    /// Same as [`call_client`](Self::call_client).
    pub async fn call_client_with_timeout<TReq, TResp>(
        &self,
        id: ClientId,
        topic: &str,
        req: TReq,
        timeout: Duration,
    ) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let args = encode_payload(&req)?;
        let bytes = self.call_client_raw(id, topic, args, timeout).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fan a call out to every attached client and resolve with the
    /// first reply from any of them.
    ///
    /// The remaining replies are dropped when they arrive. Clients
    /// without a handler for the topic stay silent, so a missing
    /// handler cannot outrun a real answer. Sends defer per client
    /// behind each readiness gate; a client that never becomes ready
    /// simply never joins the race.
    ///
    /// # Errors
    ///
    /// - [`Error::NoClients`] - no client is attached
    /// - [`Error::Timeout`] - nobody replied within `call_timeout`
    /// - [`Error::Handler`] - the winning reply was a handler failure
    pub async fn call_any_client<TReq, TResp>(&self, topic: &str, req: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let clients = self.inner.registry.all().await;
        if clients.is_empty() {
            return Err(Error::NoClients);
        }

        let args = encode_payload(&req)?;
        let call_id = CallId::generate();
        let rx = self.inner.pending.register(call_id);

        for (id, entry) in clients {
            // ---
            let ready = entry.gate.subscribe();
            let channel = entry.channel.clone();
            let frame = Frame::Request {
                topic: topic.to_owned(),
                call_id,
                broadcast: true,
                args: args.clone(),
            };

            tokio::spawn(async move {
                if await_ready(ready).await.is_err() {
                    return;
                }
                if let Err(_err) = channel.send(frame).await {
                    crate::log_debug!("fan-out send to {id} failed: {_err}");
                }
            });
        }

        let out = match time::timeout(self.inner.config.call_timeout, rx).await {
            Ok(Ok(result)) => decode_reply(result),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::Timeout),
        };

        if out.is_err() {
            self.inner.pending.remove(call_id);
        }
        out
    }

    /// Call every attached client and collect every reply.
    ///
    /// One independent call per client, run concurrently; each entry in
    /// the returned vector carries that client's own result, so a
    /// failing or timed-out client does not fail the whole fan-out.
    ///
    /// # Errors
    ///
    /// - [`Error::NoClients`] - no client is attached
    /// - [`Error::Serialization`] - the request failed to serialize
    pub async fn call_all_clients<TReq, TResp>(
        &self,
        topic: &str,
        req: TReq,
    ) -> Result<Vec<(ClientId, Result<TResp>)>>
    where
        TReq: Serialize,
        TResp: DeserializeOwned + Send + 'static,
    {
        // ---
        let ids = self.inner.registry.ids().await;
        if ids.is_empty() {
            return Err(Error::NoClients);
        }

        let args = encode_payload(&req)?;
        let timeout = self.inner.config.call_timeout;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            // ---
            let broker = self.clone();
            let topic = topic.to_owned();
            let args = args.clone();

            tasks.push((
                id,
                tokio::spawn(
                    async move { broker.call_client_raw(id, &topic, args, timeout).await },
                ),
            ));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            // ---
            let outcome = match task.await {
                Ok(Ok(bytes)) => serde_json::from_slice::<TResp>(&bytes).map_err(Error::from),
                Ok(Err(err)) => Err(err),
                Err(_join_err) => {
                    crate::log_error!("fan-out task for {id} failed: {_join_err}");
                    Err(Error::ChannelClosed)
                }
            };
            results.push((id, outcome));
        }

        Ok(results)
    }

    /// Inner call implementation shared by the typed variants.
    async fn call_client_raw(
        &self,
        id: ClientId,
        topic: &str,
        args: Bytes,
        timeout: Duration,
    ) -> Result<Bytes> {
        // ---
        let entry = self
            .inner
            .registry
            .get(id)
            .await
            .ok_or(Error::UnknownClient(id))?;

        let call_id = CallId::generate();
        let rx = self.inner.pending.register(call_id);

        let ready = entry.gate.subscribe();
        let channel = entry.channel.clone();
        let frame = Frame::Request {
            topic: topic.to_owned(),
            call_id,
            broadcast: false,
            args,
        };

        let exchange = async move {
            // ---
            await_ready(ready).await?;
            channel.send(frame).await?;

            match rx.await {
                Ok(ReplyResult::Ok(bytes)) => Ok(bytes),
                Ok(ReplyResult::Err(msg)) => Err(Error::Handler(msg)),
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

    /// Route one incoming frame from a client channel.
    async fn dispatch_frame(&self, origin: ClientId, frame: Frame) {
        // ---
        match frame {
            Frame::Ready => {
                // ---
                self.inner.registry.mark_ready(origin).await;
                crate::log_debug!("client {origin} ready");
            }

            Frame::Request {
                topic,
                call_id,
                args,
                broadcast: _,
            } => {
                // ---
                let handler = self.inner.handlers.acquire(&topic);

                let Some(entry) = self.inner.registry.get(origin).await else {
                    crate::log_warn!("request from detached client {origin}");
                    return;
                };
                let channel = entry.channel.clone();

                tokio::spawn(async move {
                    // ---
                    let result = match handler {
                        Some(handler) => handlers::run(handler, args).await,
                        None => ReplyResult::Err(format!("no handler for topic: {topic}")),
                    };

                    if let Err(_err) = channel.send(Frame::Reply { call_id, result }).await {
                        crate::log_debug!("reply to {origin} failed: {_err}");
                    }
                });
            }

            Frame::Reply { call_id, result } => {
                // ---
                if !self.inner.pending.complete(call_id, result) {
                    crate::log_debug!("no pending call for {call_id}");
                }
            }

            Frame::Relay {
                target,
                topic,
                call_id,
                args,
            } => {
                // ---
                self.handle_relay(origin, target, topic, call_id, args)
                    .await;
            }

            Frame::RelayReply { call_id, result } => {
                // ---
                match self.inner.relay.take(call_id) {
                    Some(caller) => self.answer_client(caller, call_id, result).await,
                    None => crate::log_debug!("duplicate or stale relay reply for {call_id}"),
                }
            }

            Frame::Relayed { .. } => {
                // ---
                crate::log_warn!("unexpected host-bound frame from {origin}");
            }
        }
    }

    /// Forward the request leg of a peer call.
    ///
    /// The host never executes a handler for relayed traffic; it
    /// records the originator and passes the call through. Fan-out
    /// targets every attached client, the originator included.
    async fn handle_relay(
        &self,
        origin: ClientId,
        target: Option<ClientId>,
        topic: String,
        call_id: CallId,
        args: Bytes,
    ) {
        // ---
        match target {
            Some(target_id) => {
                // ---
                let Some(entry) = self.inner.registry.get(target_id).await else {
                    let result = ReplyResult::Err(format!("unknown client: {target_id}"));
                    self.answer_client(origin, call_id, result).await;
                    return;
                };

                self.inner.relay.record(call_id, origin);

                let frame = Frame::Relayed {
                    topic,
                    call_id,
                    args,
                };
                if entry.channel.send(frame).await.is_err() {
                    // Target detached between lookup and send.
                    if self.inner.relay.take(call_id).is_some() {
                        let result = ReplyResult::Err(format!("unknown client: {target_id}"));
                        self.answer_client(origin, call_id, result).await;
                    }
                }
            }

            None => {
                // ---
                self.inner.relay.record(call_id, origin);

                for (id, entry) in self.inner.registry.all().await {
                    let frame = Frame::Relayed {
                        topic: topic.clone(),
                        call_id,
                        args: args.clone(),
                    };
                    if let Err(_err) = entry.channel.send(frame).await {
                        crate::log_debug!("relay broadcast to {id} failed: {_err}");
                    }
                }
            }
        }
    }

    /// Unicast a reply frame to one client.
    async fn answer_client(&self, id: ClientId, call_id: CallId, result: ReplyResult) {
        // ---
        let Some(entry) = self.inner.registry.get(id).await else {
            crate::log_debug!("relay originator {id} detached before its reply");
            return;
        };

        if let Err(_err) = entry.channel.send(Frame::Reply { call_id, result }).await {
            crate::log_debug!("reply to {id} failed: {_err}");
        }
    }
}
