//! Public, transport-agnostic broker configuration.
//!
//! Shared by [`HostBroker`](crate::HostBroker) and
//! [`ClientProxy`](crate::ClientProxy). Contains no channel-specific
//! concepts; transports interpret capacity into concrete buffer sizes.

use std::time::Duration;

/// Tunables for call handling on either side of a channel.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    // ---
    /// How long a call waits for its reply before failing with
    /// [`Error::Timeout`](crate::Error::Timeout).
    ///
    /// Applies to every `call_*` operation unless a `*_with_timeout`
    /// variant overrides it. Also what unblocks a call against a client
    /// that never reports ready.
    ///
    /// Default: 30 seconds
    pub call_timeout: Duration,

    /// Frames buffered per channel direction.
    ///
    /// Default: 16
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            channel_capacity: 16,
        }
    }
}

impl BrokerConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call reply timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use hub_rpc::BrokerConfig;
    /// use std::time::Duration;
    ///
    /// let config = BrokerConfig::new().with_call_timeout(Duration::from_secs(5));
    /// ```
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the per-direction channel buffer size.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
