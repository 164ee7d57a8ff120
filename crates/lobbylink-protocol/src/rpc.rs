//! Remote procedure call replies.
//!
//! The RPC surface returns `{"id": "...", "payload": ...}` where `payload`
//! is *usually* a JSON document encoded as a string, but some transports
//! hand it back already parsed. [`RpcPayload`] accepts both and
//! [`RpcPayload::decode`] performs the single decode step, so callers only
//! ever see their own typed reply.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The `payload` field of an RPC reply, in whichever shape it arrived.
///
/// `#[serde(untagged)]` tries the variants in order: a JSON string lands
/// in `Encoded`, anything else in `Structured`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcPayload {
    /// The payload is a JSON document serialized into a string.
    Encoded(String),
    /// The payload is already a JSON value.
    Structured(serde_json::Value),
}

impl RpcPayload {
    /// Decodes the payload into `T`, unwrapping the string layer if present.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the payload (after at most one
    /// string unwrap) does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ProtocolError> {
        match self {
            Self::Encoded(text) => {
                serde_json::from_str(&text).map_err(ProtocolError::Decode)
            }
            Self::Structured(value) => {
                serde_json::from_value(value).map_err(ProtocolError::Decode)
            }
        }
    }
}

/// A full RPC reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    /// The RPC id echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The procedure's return value.
    pub payload: RpcPayload,
}
