//! Notifications published by [`GameClient`](crate::GameClient) on its bus.
//!
//! Presentation code subscribes to the types it cares about; nothing here
//! carries behaviour.

use finders_shared::{math::Vec3, net::PlayerId};

use crate::roster::PlayerRecord;

/// The channel opened and `Join` was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Connected {
    pub url: String,
}

/// The session ended, for any reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// A `GameState` snapshot is about to replace the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterReset;

/// A player should be (re)spawned.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerJoined {
    pub record: PlayerRecord,
    pub is_local: bool,
}

/// A player left. Fired even for ids the roster never knew.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLeft {
    pub player_id: PlayerId,
}

/// Raw server-reported move. Fired even for ids the roster never knew.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMoved {
    pub player_id: PlayerId,
    pub position: Vec3,
}

/// Where a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSource {
    /// Connect, send or receive failure; the connection is closed.
    Transport,
    /// An inbound message could not be parsed and was discarded.
    Decode,
    /// The server sent an `Error` message.
    Server,
    /// The server sent a message kind this client does not know.
    UnknownMessage,
}

/// Something went wrong (or looked odd) without stopping the client.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticError {
    pub source: DiagnosticSource,
    pub message: String,
}
