pub mod client;
pub mod config;
pub mod events;
pub mod input;
pub mod interpolation;
pub mod prediction;
pub mod session;
pub mod sync;

pub use client::{ClientState, GameClient};
pub use config::ClientConfig;
pub use events::ClientEvent;
pub use input::Autopilot;
pub use interpolation::{
    EntitySnapshot, InterpolatedState, InterpolationBuffer, InterpolationConfig,
};
pub use prediction::{CorrectionStats, PendingInput, PredictionConfig, PredictionEngine};
pub use session::{SessionStore, StoredSession};
pub use sync::{StateSyncController, SyncEvent};
