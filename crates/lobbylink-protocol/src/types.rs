//! Core protocol types for lobbylink's wire format.
//!
//! This module defines every type that travels "on the wire" between the
//! client and the remote service:
//!
//! - the authentication RPC request/reply ([`AuthRequest`], [`AuthReply`]),
//! - the realtime socket [`Envelope`] and the typed views of it that the
//!   rest of the client works with ([`ClientRequest`], [`ServerMessage`]).
//!
//! # Why two shapes for realtime messages?
//!
//! On the wire an envelope is one JSON object with an optional `cid`
//! (correlation id) and at most one payload field, e.g.
//!
//! ```text
//! {"cid":"3","matchmaker_add":{"min_count":2,"max_count":2,"query":"*"}}
//! {"cid":"3","matchmaker_ticket":{"ticket":"6f1c..."}}
//! {"cid":"4"}                                     ← empty reply (ack)
//! {"cid":"5","ping":{}}  /  {"cid":"5","pong":{}}  ← keepalive
//! {"matchmaker_matched":{"ticket":"6f1c...","match_id":"m1"}}   ← push
//! ```
//!
//! That "struct of optional fields" shape is awkward to match on, so the
//! envelope is converted exactly once, right after decoding, into an enum.
//! Everything above the protocol layer only ever sees the enums.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// QueueMode
// ---------------------------------------------------------------------------

/// Which matchmaking queue a player wants to join.
///
/// `#[serde(rename_all = "lowercase")]` makes the JSON representation
/// `"casual"` / `"ranked"`, which is what the remote matchmaker filters on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Unrated games. The default.
    #[default]
    Casual,
    /// Rated games.
    Ranked,
}

impl QueueMode {
    /// The wire name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Ranked => "ranked",
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "casual" => Ok(Self::Casual),
            "ranked" => Ok(Self::Ranked),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown queue mode: {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication RPC
// ---------------------------------------------------------------------------

/// Body of the device authentication RPC.
///
/// The remote procedure calls the display name `nickname`; the Rust side
/// uses the clearer `display_name` and renames it on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// The stable device identifier.
    pub device_id: String,
    /// The default display name derived from the device identifier.
    #[serde(rename = "nickname")]
    pub display_name: String,
}

/// Reply of the device authentication RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthReply {
    /// Opaque session token used to open the realtime connection.
    pub token: String,
    /// The account's display name as the server knows it.
    pub username: String,
    /// Server-side account id, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl AuthReply {
    /// Rejects replies that decoded fine but cannot be used.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the token is empty.
    pub fn validated(self) -> Result<Self, ProtocolError> {
        if self.token.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "authentication reply carries an empty token".into(),
            ));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Matchmaker payloads
// ---------------------------------------------------------------------------

/// Client → Server: "Put me in the matchmaking pool."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerAdd {
    /// Minimum number of players for a match.
    pub min_count: u32,
    /// Maximum number of players for a match.
    pub max_count: u32,
    /// Matchmaker query string.
    pub query: String,
    /// String properties other players' queries can match on.
    ///
    /// `BTreeMap` (not `HashMap`) so the encoded JSON is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_properties: BTreeMap<String, String>,
}

impl MatchmakerAdd {
    /// Builds a request that only matches players queued for the same
    /// mode: the mode is advertised as the `mode` property and required
    /// by the query.
    pub fn for_mode(mode: QueueMode, min_count: u32, max_count: u32) -> Self {
        let mut string_properties = BTreeMap::new();
        string_properties.insert("mode".to_string(), mode.as_str().to_string());
        Self {
            min_count,
            max_count,
            query: format!("+properties.mode:{}", mode.as_str()),
            string_properties,
        }
    }
}

/// Client → Server: "Take this ticket out of the pool."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerRemove {
    /// The ticket to remove.
    pub ticket: String,
}

/// Server → Client: "You're in the pool, here's your ticket."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerTicket {
    /// Opaque ticket id.
    pub ticket: String,
}

/// Server → Client (push): "Your ticket was matched."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerMatched {
    /// The ticket that was matched.
    pub ticket: String,
    /// The authoritative match the players should join, if one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    /// Join token for token-based matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Server → Client: "That request failed."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code (gRPC-style status codes).
    pub code: i32,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// Client → Server: "Are you still there?" The server answers with
/// [`Pong`] under the same `cid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ping {}

/// Server → Client: answer to a [`Ping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pong {}

/// Names of envelope fields this client does not model.
///
/// The service sends payload kinds the client has no use for (presence
/// events, channel messages, ...). Their values are skipped while decoding
/// and only the field names are kept, so an envelope carrying one of them
/// is not mistaken for an empty reply. Nothing is written back when
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownFields(Vec<String>);

impl UnknownFields {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UnknownFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldNames;

        impl<'de> Visitor<'de> for FieldNames {
            type Value = UnknownFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of envelope fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut names = Vec::new();
                while let Some((name, IgnoredAny)) = map.next_entry::<String, IgnoredAny>()? {
                    names.push(name);
                }
                Ok(UnknownFields(names))
            }
        }

        deserializer.deserialize_map(FieldNames)
    }
}

impl Serialize for UnknownFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

// ---------------------------------------------------------------------------
// Typed views
// ---------------------------------------------------------------------------

/// A request the client sends over the realtime connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Join the matchmaking pool.
    MatchmakerAdd(MatchmakerAdd),
    /// Leave the matchmaking pool.
    MatchmakerRemove(MatchmakerRemove),
    /// Keepalive.
    Ping,
}

impl ClientRequest {
    /// Shorthand for a [`ClientRequest::MatchmakerRemove`].
    pub fn remove(ticket: impl Into<String>) -> Self {
        Self::MatchmakerRemove(MatchmakerRemove {
            ticket: ticket.into(),
        })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MatchmakerAdd(_) => "matchmaker_add",
            Self::MatchmakerRemove(_) => "matchmaker_remove",
            Self::Ping => "ping",
        }
    }
}

/// A message the server sends over the realtime connection.
///
/// Replies carry the `cid` of the request they answer; pushes carry none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Empty reply: the request succeeded and there is nothing to return.
    Ack,
    /// Reply to `ping`.
    Pong,
    /// Reply to `matchmaker_add`.
    MatchmakerTicket { ticket: String },
    /// Push: a ticket was matched.
    MatchmakerMatched(MatchmakerMatched),
    /// The request failed on the server side.
    Error { code: i32, message: String },
}

// ---------------------------------------------------------------------------
// Envelope: the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level realtime message. Every frame on the socket is an Envelope.
///
/// Exactly one payload field may be set. An envelope with a `cid` and no
/// payload is an empty reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id linking a reply to its request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchmaker_add: Option<MatchmakerAdd>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchmaker_remove: Option<MatchmakerRemove>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchmaker_ticket: Option<MatchmakerTicket>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchmaker_matched: Option<MatchmakerMatched>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<Ping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pong: Option<Pong>,

    /// Everything else the server put in the envelope.
    #[serde(flatten)]
    pub unknown: UnknownFields,
}

impl Envelope {
    /// Wraps a client request with its correlation id.
    pub fn request(cid: impl Into<String>, request: ClientRequest) -> Self {
        let mut envelope = Self {
            cid: Some(cid.into()),
            ..Self::default()
        };
        match request {
            ClientRequest::MatchmakerAdd(add) => {
                envelope.matchmaker_add = Some(add);
            }
            ClientRequest::MatchmakerRemove(remove) => {
                envelope.matchmaker_remove = Some(remove);
            }
            ClientRequest::Ping => envelope.ping = Some(Ping {}),
        }
        envelope
    }

    /// Wraps a server message. `cid` is `None` for pushes.
    pub fn server(cid: Option<String>, message: ServerMessage) -> Self {
        let mut envelope = Self {
            cid,
            ..Self::default()
        };
        match message {
            ServerMessage::Ack => {}
            ServerMessage::Pong => envelope.pong = Some(Pong {}),
            ServerMessage::MatchmakerTicket { ticket } => {
                envelope.matchmaker_ticket = Some(MatchmakerTicket { ticket });
            }
            ServerMessage::MatchmakerMatched(matched) => {
                envelope.matchmaker_matched = Some(matched);
            }
            ServerMessage::Error { code, message } => {
                envelope.error = Some(ErrorBody { code, message });
            }
        }
        envelope
    }

    fn payload_count(&self) -> usize {
        [
            self.matchmaker_add.is_some(),
            self.matchmaker_remove.is_some(),
            self.matchmaker_ticket.is_some(),
            self.matchmaker_matched.is_some(),
            self.error.is_some(),
            self.ping.is_some(),
            self.pong.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Converts a received envelope into its typed server view.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if more than one payload
    /// is set, if the payload is a client request, if the only payload is
    /// one this client does not model, or if the envelope is empty and has
    /// no `cid` either.
    pub fn into_server_message(
        self,
    ) -> Result<(Option<String>, ServerMessage), ProtocolError> {
        if self.payload_count() > 1 {
            return Err(ProtocolError::InvalidMessage(
                "envelope carries more than one payload".into(),
            ));
        }
        if self.matchmaker_add.is_some() || self.matchmaker_remove.is_some() || self.ping.is_some()
        {
            return Err(ProtocolError::InvalidMessage(
                "client request received from server".into(),
            ));
        }

        let message = if let Some(error) = self.error {
            ServerMessage::Error {
                code: error.code,
                message: error.message,
            }
        } else if let Some(ticket) = self.matchmaker_ticket {
            ServerMessage::MatchmakerTicket {
                ticket: ticket.ticket,
            }
        } else if let Some(matched) = self.matchmaker_matched {
            ServerMessage::MatchmakerMatched(matched)
        } else if self.pong.is_some() {
            ServerMessage::Pong
        } else if !self.unknown.is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "unsupported payload: {}",
                self.unknown.names().join(", ")
            )));
        } else if self.cid.is_some() {
            ServerMessage::Ack
        } else {
            return Err(ProtocolError::InvalidMessage(
                "empty envelope without cid".into(),
            ));
        };

        Ok((self.cid, message))
    }

    /// Converts a received envelope into the client request it carries.
    /// This is the server-side view, used by test doubles of the service.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the `cid` is missing or
    /// the envelope does not carry exactly one client request.
    pub fn into_client_request(
        self,
    ) -> Result<(String, ClientRequest), ProtocolError> {
        if self.payload_count() != 1 {
            return Err(ProtocolError::InvalidMessage(
                "request envelope must carry exactly one payload".into(),
            ));
        }
        let cid = self.cid.ok_or_else(|| {
            ProtocolError::InvalidMessage("request without cid".into())
        })?;
        let request = match (self.matchmaker_add, self.matchmaker_remove, self.ping) {
            (Some(add), None, None) => ClientRequest::MatchmakerAdd(add),
            (None, Some(remove), None) => ClientRequest::MatchmakerRemove(remove),
            (None, None, Some(_)) => ClientRequest::Ping,
            _ => {
                return Err(ProtocolError::InvalidMessage(
                    "server message received from client".into(),
                ));
            }
        };
        Ok((cid, request))
    }
}

// =========================================================================
// Tests
// =========================================================================
