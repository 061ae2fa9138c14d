use gridclaim::{LobbyPlayer, PlayerId};

use super::sync::SyncEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RoomJoined {
        room_code: String,
        player_id: PlayerId,
    },
    RoomUpdated {
        room_code: String,
        players: Vec<LobbyPlayer>,
    },
    GameStarting {
        countdown_secs: u32,
    },
    GameEnded {
        winner_id: Option<PlayerId>,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    PlayerDisconnected {
        player_id: PlayerId,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    ReconnectFailed {
        reason: String,
    },
    ServerError {
        message: String,
    },
    TransportError {
        message: String,
    },
    JoinTimedOut,
    Disconnected,
    Sync(SyncEvent),
}

impl ClientEvent {
    /// True for events that end the session from the client's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientEvent::Disconnected | ClientEvent::JoinTimedOut)
    }
}
