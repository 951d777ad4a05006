//! Request/reply RPC between a host process and its satellite clients,
//! with automatic call correlation
//!
//! This library connects one coordinating process (the host) to a
//! dynamically changing set of client processes, each reachable through
//! exactly one dedicated bidirectional channel. It handles call ID
//! generation, request/reply matching, timeout handling, deferral of
//! sends to clients that are still initializing, and host-mediated
//! relay of client-to-client calls.
//!

// Import all sub modules once...
mod client;
mod domain;
mod host;
mod transport;

mod config;

mod correlation;
mod error;
mod handlers;
mod macros;
mod pending;
mod protocol;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::ClientProxy;
pub use host::HostBroker;

pub use config::BrokerConfig;

pub use correlation::CallId;
pub use error::{Error, Result};

pub use transport::memory::pair as memory_pair;

// --- public re-exports
pub use domain::{
    //
    Channel,
    ChannelPtr,
    ClientId,
    Endpoint,
    Inbox,
};

pub use protocol::{Frame, ReplyResult};
