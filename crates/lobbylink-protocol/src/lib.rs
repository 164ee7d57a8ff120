//! Wire protocol for lobbylink.
//!
//! This crate defines the "language" the client and the remote service
//! speak:
//!
//! - **Types** ([`Envelope`], [`ClientRequest`], [`ServerMessage`],
//!   [`AuthRequest`], [`AuthReply`], [`QueueMode`]): the structures that
//!   travel on the wire, and the typed views the client works with.
//! - **RPC** ([`RpcReply`], [`RpcPayload`]): normalization of RPC replies
//!   whose payload may arrive encoded as a string or already structured.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the session
//! and connection layers. It doesn't know about sockets or retries; it
//! only knows how to serialize and deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope → ServerMessage) → Connection
//! ```

mod codec;
mod error;
#[cfg(feature = "json")]
mod rpc;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
#[cfg(feature = "json")]
pub use rpc::{RpcPayload, RpcReply};
pub use types::{
    AuthReply, AuthRequest, ClientRequest, Envelope, ErrorBody,
    MatchmakerAdd, MatchmakerMatched, MatchmakerRemove, MatchmakerTicket,
    Ping, Pong, QueueMode, ServerMessage, UnknownFields,
};
