//! Error types for the protocol layer.
//!
//! Each crate in lobbylink defines its own error enum. When you see a
//! `ProtocolError`, the bytes arrived fine but their content could not be
//! turned into (or produced from) the expected typed shape. That is a
//! different failure from the network going away, and callers treat it
//! differently: protocol errors are never retried automatically.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is invalid at the protocol level.
    ///
    /// This is for logical errors that pass deserialization but
    /// violate protocol rules, e.g. an envelope carrying two payloads
    /// or an authentication reply with an empty token.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
