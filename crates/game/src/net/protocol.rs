use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::types::{Direction, GridPosition, PlayerId, Tick};

pub const MAX_DATAGRAM_SIZE: usize = 65_507;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4752_4443;
pub const DEFAULT_PORT: u16 = 27_016;
pub const DEFAULT_TICK_RATE: u32 = 10;

/// Sequence number for messages that bypass ordering checks.
pub const UNSEQUENCED: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct EnvelopeHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
}

impl EnvelopeHeader {
    pub fn new(sequence: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ClientMessage {
    JoinRoom {
        room_code: Option<String>,
        player_name: String,
    },
    LeaveRoom,
    Ready,
    Reconnect {
        room_code: String,
        token: String,
    },
    GameInput(Vec<u8>),
    Ping {
        timestamp_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ServerMessage {
    RoomJoined {
        room_code: String,
        player_id: PlayerId,
        reconnect_token: String,
    },
    RoomUpdate {
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
    Error {
        message: String,
    },
    Pong {
        timestamp_ms: u64,
    },
    PlayerDisconnected {
        player_id: PlayerId,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    GameMessage(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ClientEnvelope {
    pub header: EnvelopeHeader,
    pub payload: ClientMessage,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ServerEnvelope {
    pub header: EnvelopeHeader,
    pub payload: ServerMessage,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad envelope header (magic {magic:#x}, version {version})")]
    BadHeader { magic: u32, version: u32 },
}

impl ClientEnvelope {
    pub fn new(sequence: u32, payload: ClientMessage) -> Self {
        Self {
            header: EnvelopeHeader::new(sequence),
            payload,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let envelope = rkyv::from_bytes::<Self, rancor::Error>(data)
            .map_err(PacketError::Deserialize)?;
        check_header(&envelope.header)?;
        Ok(envelope)
    }
}

impl ServerEnvelope {
    pub fn new(sequence: u32, payload: ServerMessage) -> Self {
        Self {
            header: EnvelopeHeader::new(sequence),
            payload,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let envelope = rkyv::from_bytes::<Self, rancor::Error>(data)
            .map_err(PacketError::Deserialize)?;
        check_header(&envelope.header)?;
        Ok(envelope)
    }
}

fn check_header(header: &EnvelopeHeader) -> Result<(), PacketError> {
    if header.is_valid() {
        Ok(())
    } else {
        Err(PacketError::BadHeader {
            magic: header.magic,
            version: header.version,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum StateKind {
    Full,
    Delta,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub position: GridPosition,
    pub direction: Direction,
    pub alive: bool,
    pub score: u32,
    pub color: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct OwnerRun {
    pub owner_id: PlayerId,
    pub count: u32,
}

impl OwnerRun {
    pub const fn new(owner_id: PlayerId, count: u32) -> Self {
        Self { owner_id, count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TerritoryRow {
    pub y: u32,
    pub runs: Vec<OwnerRun>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct CellChange {
    pub x: i32,
    pub y: i32,
    pub owner_id: PlayerId,
}

impl CellChange {
    pub const fn new(x: i32, y: i32, owner_id: PlayerId) -> Self {
        Self { x, y, owner_id }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub kind: StateKind,
    pub grid_width: u32,
    pub grid_height: u32,
    pub players: Vec<PlayerState>,
    pub territory_rows: Vec<TerritoryRow>,
    pub territory_delta: Vec<CellChange>,
}

impl WorldSnapshot {
    pub fn full(tick: Tick, grid_width: u32, grid_height: u32) -> Self {
        Self {
            tick,
            kind: StateKind::Full,
            grid_width,
            grid_height,
            players: Vec::new(),
            territory_rows: Vec::new(),
            territory_delta: Vec::new(),
        }
    }

    pub fn delta(tick: Tick, grid_width: u32, grid_height: u32) -> Self {
        Self {
            kind: StateKind::Delta,
            ..Self::full(tick, grid_width, grid_height)
        }
    }

    pub fn is_full(&self) -> bool {
        self.kind == StateKind::Full
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct JoinResponse {
    pub player_id: PlayerId,
    pub tick_rate: u32,
    pub move_interval_ticks: u32,
    pub state: WorldSnapshot,
}

/// Game-level payload carried inside `ServerMessage::GameMessage`.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum GamePayload {
    JoinResponse(JoinResponse),
    State(WorldSnapshot),
}

impl GamePayload {
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(PacketError::Deserialize)
    }
}

/// Direction change sent inside `ClientMessage::GameInput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct InputCommand {
    pub tick: Tick,
    pub direction: Direction,
}

impl InputCommand {
    pub fn new(tick: Tick, direction: Direction) -> Self {
        Self { tick, direction }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(PacketError::Deserialize)
    }
}
