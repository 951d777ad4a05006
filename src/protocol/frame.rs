use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{CallId, ClientId, Error, Result};

/// Outcome carried by a reply frame.
///
/// Every call is answered with one of these, so a caller can distinguish
/// "handler failed" from "no reply yet" instead of hanging on a reply
/// that will never come.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplyResult {
    /// Handler completed; payload is its serialized return value.
    Ok(Bytes),
    /// Handler failed, or no handler was registered for the topic.
    Err(String),
}

/// The unit of exchange on a host↔client channel.
///
/// Payload fields (`args`, `ReplyResult::Ok`) carry opaque bytes holding
/// JSON of the caller's typed value; an ordered argument sequence is a
/// serde tuple. The channel layer does not interpret them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// Client signals that its execution context finished initializing.
    /// The host releases sends deferred behind the readiness gate.
    Ready,

    /// A call addressed at the receiving side.
    Request {
        /// Topic naming the handler to invoke.
        topic: String,
        /// Correlation identifier echoed by the reply.
        call_id: CallId,
        /// Set on host fan-out sends. A client without a matching
        /// handler stays silent for broadcast requests instead of
        /// racing a handler-not-found error against real answers.
        broadcast: bool,
        /// Serialized call arguments.
        args: Bytes,
    },

    /// Terminates the `Request` or relayed call with the same call ID.
    Reply {
        call_id: CallId,
        result: ReplyResult,
    },

    /// Client→host leg of a peer call. The host forwards it as
    /// `Relayed` to the target, or to every attached client when
    /// `target` is `None`.
    Relay {
        target: Option<ClientId>,
        topic: String,
        call_id: CallId,
        args: Bytes,
    },

    /// Host→target leg of a relayed call.
    Relayed {
        topic: String,
        call_id: CallId,
        args: Bytes,
    },

    /// Target→host leg of a relayed call's reply. The host routes it
    /// back to the recorded originator as a `Reply`.
    RelayReply {
        call_id: CallId,
        result: ReplyResult,
    },
}

/// Serialize a typed value into a payload field.
pub(crate) fn encode_payload<T: Serialize>(value: &T) -> Result<Bytes> {
    // ---
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Unwrap a reply envelope into the caller's typed result.
pub(crate) fn decode_reply<T: DeserializeOwned>(result: ReplyResult) -> Result<T> {
    // ---
    match result {
        ReplyResult::Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        ReplyResult::Err(msg) => Err(Error::Handler(msg)),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_frame_serde_round_trip() {
        // ---
        let frame = Frame::Request {
            topic: "ping".to_owned(),
            call_id: CallId::generate(),
            broadcast: false,
            args: encode_payload(&(1, "two", 3.0)).unwrap(),
        };

        let json = serde_json::to_vec(&frame).unwrap();
        let back: Frame = serde_json::from_slice(&json).unwrap();

        match (frame, back) {
            (
                Frame::Request {
                    call_id: a, args: x, ..
                },
                Frame::Request {
                    call_id: b, args: y, ..
                },
            ) => {
                assert_eq!(a, b);
                assert_eq!(x, y);
            }
            other => panic!("frame kind changed in round trip: {other:?}"),
        }
    }

    #[test]
    fn test_decode_err_reply() {
        // ---
        let err = decode_reply::<i32>(ReplyResult::Err("boom".to_owned()));
        match err {
            Err(Error::Handler(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected handler error, got {other:?}"),
        }
    }
}
