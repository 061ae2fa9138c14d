mod protocol;
mod stats;
mod tracking;
mod transport;

pub use protocol::{
    CellChange, ClientEnvelope, ClientMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, EnvelopeHeader,
    GamePayload, InputCommand, JoinResponse, LobbyPlayer, MAX_DATAGRAM_SIZE, OwnerRun,
    PROTOCOL_MAGIC, PROTOCOL_VERSION, PacketError, PlayerState, ServerEnvelope, ServerMessage,
    StateKind, TerritoryRow, UNSEQUENCED, WorldSnapshot,
};
pub use stats::{NetworkStats, unix_time_ms};
pub use tracking::{ReceiveTracker, SendSequence, SequenceOutcome};
pub use transport::{Transport, TransportConfig, TransportError, TransportEvent};
