use thiserror::Error;

/// Errors that can occur during hub RPC operations
#[derive(Error, Debug)]
pub enum Error {
    /// Call timed out waiting for a reply
    #[error("call timed out")]
    Timeout,

    /// Channel to the peer closed before the reply arrived
    #[error("channel closed")]
    ChannelClosed,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote handler failed, or no handler was registered for the topic
    #[error("remote handler failed: {0}")]
    Handler(String),

    /// No client with this identity is attached to the host
    #[error("unknown client: {0}")]
    UnknownClient(crate::ClientId),

    /// A fan-out call found no attached clients
    #[error("no clients attached")]
    NoClients,
}

/// Result type alias for hub RPC operations
pub type Result<T> = std::result::Result<T, Error>;
