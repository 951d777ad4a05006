/// Protocol types for call correlation and serialization
///
/// This module defines the wire format for request/reply frames and the
/// relay envelopes carried between host and clients.
mod frame;

pub use frame::{Frame, ReplyResult};

pub(crate) use frame::{decode_reply, encode_payload};
