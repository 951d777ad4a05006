// src/host/registry.rs

//! Attached client registry.
//!
//! Host-side table of connected clients: their channels, identities, and
//! readiness gates. Entries are inserted by `HostBroker::attach` and
//! removed when a client's channel closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::host::readiness::ReadinessGate;
use crate::{ChannelPtr, ClientId};

/// Per-client state held by the host.
pub(crate) struct ClientEntry {
    // ---
    pub channel: ChannelPtr,
    pub gate: ReadinessGate,
}

pub(crate) struct ClientRegistry {
    // ---
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, Arc<ClientEntry>>>,
}

impl ClientRegistry {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            next_id: AtomicU64::new(1),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a client channel and assign its identity.
    pub async fn insert(&self, channel: ChannelPtr) -> ClientId {
        // ---
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let entry = Arc::new(ClientEntry {
            channel,
            gate: ReadinessGate::new(),
        });

        self.clients.write().await.insert(id, entry);
        id
    }

    pub async fn remove(&self, id: ClientId) -> Option<Arc<ClientEntry>> {
        // ---
        self.clients.write().await.remove(&id)
    }

    pub async fn get(&self, id: ClientId) -> Option<Arc<ClientEntry>> {
        // ---
        self.clients.read().await.get(&id).cloned()
    }

    /// Snapshot of every attached client.
    pub async fn all(&self) -> Vec<(ClientId, Arc<ClientEntry>)> {
        // ---
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    /// Identities of every attached client.
    pub async fn ids(&self) -> Vec<ClientId> {
        // ---
        self.clients.read().await.keys().copied().collect()
    }

    pub async fn mark_ready(&self, id: ClientId) {
        // ---
        if let Some(entry) = self.get(id).await {
            entry.gate.mark_ready();
        }
    }
}
