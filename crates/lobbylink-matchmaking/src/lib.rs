//! Matchmaking for lobbylink.
//!
//! [`MatchmakingClient`] turns "find me a casual match" into a
//! `matchmaker_add` request over the managed connection and hands back a
//! [`QueueTicket`]. Matches arrive later as server pushes, surfaced
//! through [`MatchSubscription`].
//!
//! Tickets are bound to the connection they were issued on. There is no
//! ticket registry to clean up: when the connection drops, every ticket
//! issued on it simply stops being live.

mod client;
mod error;

pub use client::{MatchFound, MatchSubscription, MatchmakerConfig, MatchmakingClient, QueueTicket};
pub use error::MatchmakingError;
