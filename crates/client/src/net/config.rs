use std::path::PathBuf;

use gridclaim::{DEFAULT_TICK_RATE, TransportConfig};

use super::interpolation::InterpolationConfig;
use super::prediction::PredictionConfig;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub player_name: String,
    pub room_code: Option<String>,
    /// Used until the server's join response announces the real rate.
    pub tick_rate: u32,
    pub ping_interval_secs: f32,
    pub join_timeout_secs: f32,
    pub reconnect_timeout_secs: f32,
    pub session_file: Option<PathBuf>,
    pub transport: TransportConfig,
    pub prediction: PredictionConfig,
    pub interpolation: InterpolationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_name: "player".to_string(),
            room_code: None,
            tick_rate: DEFAULT_TICK_RATE,
            ping_interval_secs: 1.0,
            join_timeout_secs: 10.0,
            reconnect_timeout_secs: 3.0,
            session_file: None,
            transport: TransportConfig::default(),
            prediction: PredictionConfig::default(),
            interpolation: InterpolationConfig {
                tick_duration_secs: 1.0 / DEFAULT_TICK_RATE as f64,
                ..Default::default()
            },
        }
    }
}
