//! Topic handler registry.
//!
//! Wraps typed async handler functions into type-erased entries keyed by
//! topic, so one registry can hold handlers of different request and
//! response types. Registrations are either persistent (process
//! lifetime) or one-shot: a one-shot entry is removed from the registry
//! before its first invocation runs, so a second message on the same
//! topic can never reach it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::pending::lock_ignore_poison;
use crate::protocol::ReplyResult;
use crate::Result;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async handler function.
///
/// Takes serialized request bytes and returns serialized response bytes.
/// Wrapped in Arc for cheap cloning when spawning tasks.
pub(crate) type BoxedHandler =
    Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<Bytes>> + Send + Sync>;

/// Registration lifetime of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandlerMode {
    // ---
    /// Lives for the process lifetime.
    Persistent,
    /// Removed before its first invocation runs.
    OneShot,
}

struct Entry {
    // ---
    handler: BoxedHandler,
    mode: HandlerMode,
}

/// Registry of topic handlers for one direction of traffic.
pub(crate) struct HandlerRegistry {
    // ---
    entries: Mutex<HashMap<String, Entry>>,
}

impl HandlerRegistry {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a typed handler for a topic.
    ///
    /// A later registration on the same topic replaces the earlier one.
    pub fn register<TReq, TResp, F, Fut>(&self, topic: &str, mode: HandlerMode, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        let entry = Entry {
            handler: wrap_handler(handler),
            mode,
        };
        lock_ignore_poison(&self.entries).insert(topic.to_owned(), entry);
    }

    /// Fetch the handler for a topic, removing it first when one-shot.
    pub fn acquire(&self, topic: &str) -> Option<BoxedHandler> {
        // ---
        let mut entries = lock_ignore_poison(&self.entries);

        match entries.get(topic) {
            Some(entry) if entry.mode == HandlerMode::OneShot => {
                entries.remove(topic).map(|entry| entry.handler)
            }
            Some(entry) => Some(entry.handler.clone()),
            None => None,
        }
    }
}

/// Wrap a typed handler function into a type-erased handler.
///
/// Deserializes the request payload, runs the handler, serializes the
/// response payload. Serialization failures and handler failures both
/// surface as `Err`, which the dispatch site turns into an error reply.
fn wrap_handler<TReq, TResp, F, Fut>(handler: F) -> BoxedHandler
where
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
    F: Fn(TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
{
    // ---
    Arc::new(move |bytes: Bytes| {
        let req: TReq = match serde_json::from_slice(&bytes) {
            Ok(req) => req,
            Err(err) => {
                return Box::pin(async move { Err(err.into()) })
                    as BoxFuture<'static, Result<Bytes>>
            }
        };

        let fut = handler(req);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(Bytes::from(serde_json::to_vec(&resp)?))
        })
    })
}

/// Run an acquired handler and fold its outcome into a reply envelope.
pub(crate) async fn run(handler: BoxedHandler, args: Bytes) -> ReplyResult {
    // ---
    match handler(args).await {
        Ok(bytes) => ReplyResult::Ok(bytes),
        Err(err) => ReplyResult::Err(err.to_string()),
    }
}
