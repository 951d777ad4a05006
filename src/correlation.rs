use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique correlation identifier used to match a request with its reply.
///
/// Call IDs are generated by the calling side, carried *in-band* inside
/// frames, and echoed verbatim by the replying side. They are opaque to
/// the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Generate a new unique call ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_generate_unique() {
        // ---
        let id1 = CallId::generate();
        let id2 = CallId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_format() {
        // ---
        let id = CallId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 36); // Standard UUID format
    }

    #[test]
    fn test_serde_round_trip() {
        // ---
        let id = CallId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: CallId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
