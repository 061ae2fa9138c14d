pub mod net;
pub mod simulation;
pub mod territory;
pub mod types;

pub use net::{
    CellChange, ClientEnvelope, ClientMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, GamePayload,
    InputCommand, JoinResponse, LobbyPlayer, NetworkStats, OwnerRun, PacketError, PlayerState,
    SequenceOutcome, ServerEnvelope, ServerMessage, StateKind, TerritoryRow, Transport,
    TransportConfig, TransportError, TransportEvent, WorldSnapshot,
};
pub use simulation::{FixedTimestep, TickClock};
pub use territory::{ChangeRecord, TerritoryGrid};
pub use types::{Direction, GridBounds, GridPosition, PlayerId, Tick, UNCLAIMED};
