use std::collections::{HashMap, HashSet, VecDeque};

use gridclaim::{
    ChangeRecord, GridBounds, JoinResponse, PlayerId, PlayerState, StateKind, TerritoryGrid,
    TerritoryRow, Tick, WorldSnapshot,
};

use super::interpolation::{InterpolationBuffer, InterpolationConfig, grid_to_world};
use super::prediction::{PredictionConfig, PredictionEngine};

/// Deltas dropped before a baseline are logged on the first drop and then every Nth.
pub const DROPPED_DELTA_LOG_INTERVAL: u64 = 30;

/// Full states announcing a larger grid than this are dropped.
pub const MAX_GRID_CELLS: usize = 1 << 22;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    JoinedGame { player_id: PlayerId },
    StateProcessed(WorldSnapshot),
    TerritoryChanged(Vec<ChangeRecord>),
    PlayerJoined { player_id: PlayerId, name: String },
    PlayerEliminated { player_id: PlayerId },
    PlayerRespawned { player_id: PlayerId },
    PlayerRemoved { player_id: PlayerId },
}

pub struct StateSyncController {
    interpolation_config: InterpolationConfig,
    grid: Option<TerritoryGrid>,
    prediction: PredictionEngine,
    local_player_id: Option<PlayerId>,
    local_initialized: bool,
    roster: HashMap<PlayerId, bool>,
    buffers: HashMap<PlayerId, InterpolationBuffer>,
    has_baseline: bool,
    last_applied_tick: Option<Tick>,
    previous_rows: Vec<TerritoryRow>,
    dropped_deltas: u64,
    stale_states: u64,
    rejected_states: u64,
    pending_events: VecDeque<SyncEvent>,
}

impl StateSyncController {
    pub fn new(prediction: &PredictionConfig, interpolation: InterpolationConfig) -> Self {
        Self {
            interpolation_config: interpolation,
            grid: None,
            prediction: PredictionEngine::new(GridBounds::new(0, 0), prediction),
            local_player_id: None,
            local_initialized: false,
            roster: HashMap::new(),
            buffers: HashMap::new(),
            has_baseline: false,
            last_applied_tick: None,
            previous_rows: Vec::new(),
            dropped_deltas: 0,
            stale_states: 0,
            rejected_states: 0,
            pending_events: VecDeque::new(),
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SyncEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn set_tick_rate(&mut self, tick_rate: u32) {
        self.interpolation_config.tick_duration_secs = 1.0 / tick_rate.max(1) as f64;
    }

    pub fn handle_join_response(&mut self, response: JoinResponse) {
        log::info!(
            "Joined game as player {} ({} ticks/s, move every {} ticks, {}x{} grid)",
            response.player_id,
            response.tick_rate,
            response.move_interval_ticks,
            response.state.grid_width,
            response.state.grid_height
        );

        self.reset();
        self.local_player_id = Some(response.player_id);
        self.set_tick_rate(response.tick_rate);
        self.prediction
            .set_move_interval(response.move_interval_ticks);

        self.pending_events.push_back(SyncEvent::JoinedGame {
            player_id: response.player_id,
        });

        let mut state = response.state;
        if state.kind != StateKind::Full {
            log::warn!("Join response carried a delta state, treating it as full");
            state.kind = StateKind::Full;
        }
        self.apply_state(state);
    }

    /// Returns `true` if the state was applied.
    pub fn apply_state(&mut self, mut snapshot: WorldSnapshot) -> bool {
        if let Some(last) = self.last_applied_tick
            && snapshot.tick <= last
        {
            self.stale_states += 1;
            log::debug!(
                "Ignoring state for tick {} (already applied {})",
                snapshot.tick,
                last
            );
            return false;
        }

        let changes = match snapshot.kind {
            StateKind::Delta => {
                let Some(grid) = self.grid.as_mut().filter(|_| self.has_baseline) else {
                    self.dropped_deltas += 1;
                    if self.dropped_deltas == 1
                        || self.dropped_deltas % DROPPED_DELTA_LOG_INTERVAL == 0
                    {
                        log::warn!(
                            "Dropping delta for tick {} without a baseline ({} dropped so far)",
                            snapshot.tick,
                            self.dropped_deltas
                        );
                    }
                    return false;
                };

                snapshot.territory_rows = self.previous_rows.clone();
                grid.apply_delta_changes(&snapshot.territory_delta)
            }
            StateKind::Full => {
                if !grid_dimensions_valid(snapshot.grid_width, snapshot.grid_height) {
                    self.rejected_states += 1;
                    log::warn!(
                        "Dropping full state for tick {} with unusable grid {}x{}",
                        snapshot.tick,
                        snapshot.grid_width,
                        snapshot.grid_height
                    );
                    return false;
                }

                let grid = self.ensure_grid(snapshot.grid_width, snapshot.grid_height);
                let changes = grid.apply_full_state(&snapshot.territory_rows);
                self.previous_rows = snapshot.territory_rows.clone();
                self.has_baseline = true;
                changes
            }
        };

        self.last_applied_tick = Some(snapshot.tick);

        if !changes.is_empty() {
            self.pending_events
                .push_back(SyncEvent::TerritoryChanged(changes));
        }

        self.sync_players(snapshot.tick, &snapshot.players);
        self.pending_events
            .push_back(SyncEvent::StateProcessed(snapshot));

        true
    }

    fn ensure_grid(&mut self, width: u32, height: u32) -> &mut TerritoryGrid {
        let rebuild = self
            .grid
            .as_ref()
            .is_none_or(|g| g.width() != width || g.height() != height);

        if rebuild {
            if let Some(old) = self.grid.as_mut() {
                log::info!("Grid dimensions changed to {}x{}, rebuilding", width, height);
                let cleared = old.clear();
                if !cleared.is_empty() {
                    self.pending_events
                        .push_back(SyncEvent::TerritoryChanged(cleared));
                }
            }
            let grid = TerritoryGrid::new(width, height);
            self.prediction.set_bounds(grid.bounds());
            self.grid = Some(grid);
        }

        self.grid.get_or_insert_with(|| TerritoryGrid::new(width, height))
    }

    fn sync_players(&mut self, tick: Tick, players: &[PlayerState]) {
        let mut seen = HashSet::with_capacity(players.len());

        for player in players {
            seen.insert(player.id);

            let previous = self.roster.insert(player.id, player.alive);
            let respawned = match previous {
                None => {
                    log::debug!("Player {} ({}) joined", player.id, player.name);
                    self.pending_events.push_back(SyncEvent::PlayerJoined {
                        player_id: player.id,
                        name: player.name.clone(),
                    });
                    false
                }
                Some(true) if !player.alive => {
                    self.pending_events.push_back(SyncEvent::PlayerEliminated {
                        player_id: player.id,
                    });
                    false
                }
                Some(false) if player.alive => {
                    self.pending_events.push_back(SyncEvent::PlayerRespawned {
                        player_id: player.id,
                    });
                    true
                }
                _ => false,
            };

            let buffer = self
                .buffers
                .entry(player.id)
                .or_insert_with(|| InterpolationBuffer::new(self.interpolation_config.clone()));
            if respawned {
                buffer.clear();
            }
            buffer.add_snapshot(
                tick,
                grid_to_world(player.position),
                player.direction,
                player.alive,
            );

            if self.local_player_id == Some(player.id) {
                self.feed_prediction(tick, player, previous.is_none() || respawned);
            }
        }

        let removed: Vec<PlayerId> = self
            .roster
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();

        for player_id in removed {
            self.roster.remove(&player_id);
            self.buffers.remove(&player_id);
            if self.local_player_id == Some(player_id) {
                self.local_initialized = false;
            }
            log::debug!("Player {} removed", player_id);
            self.pending_events
                .push_back(SyncEvent::PlayerRemoved { player_id });
        }
    }

    fn feed_prediction(&mut self, tick: Tick, player: &PlayerState, fresh: bool) {
        if !player.alive {
            return;
        }

        if fresh || !self.local_initialized {
            self.prediction
                .initialize(player.position, player.direction);
            self.local_initialized = true;
            return;
        }

        self.prediction
            .reconcile(tick, player.position, player.direction);
    }

    pub fn reset(&mut self) {
        self.grid = None;
        self.local_player_id = None;
        self.local_initialized = false;
        self.roster.clear();
        self.buffers.clear();
        self.has_baseline = false;
        self.last_applied_tick = None;
        self.previous_rows.clear();
        self.dropped_deltas = 0;
        self.stale_states = 0;
        self.rejected_states = 0;
        self.pending_events.clear();
    }

    pub fn grid(&self) -> Option<&TerritoryGrid> {
        self.grid.as_ref()
    }

    pub fn prediction(&self) -> &PredictionEngine {
        &self.prediction
    }

    pub fn prediction_mut(&mut self) -> &mut PredictionEngine {
        &mut self.prediction
    }

    pub fn buffer(&self, player_id: PlayerId) -> Option<&InterpolationBuffer> {
        self.buffers.get(&player_id)
    }

    pub fn players(&self) -> impl Iterator<Item = (PlayerId, bool)> + '_ {
        self.roster.iter().map(|(&id, &alive)| (id, alive))
    }

    pub fn is_alive(&self, player_id: PlayerId) -> bool {
        self.roster.get(&player_id).copied().unwrap_or(false)
    }

    pub fn local_player_id(&self) -> Option<PlayerId> {
        self.local_player_id
    }

    pub fn has_baseline(&self) -> bool {
        self.has_baseline
    }

    pub fn last_applied_tick(&self) -> Option<Tick> {
        self.last_applied_tick
    }

    pub fn dropped_delta_count(&self) -> u64 {
        self.dropped_deltas
    }

    pub fn stale_state_count(&self) -> u64 {
        self.stale_states
    }

    pub fn rejected_state_count(&self) -> u64 {
        self.rejected_states
    }
}

fn grid_dimensions_valid(width: u32, height: u32) -> bool {
    let addressable = 1..=i32::MAX as u32;
    addressable.contains(&width)
        && addressable.contains(&height)
        && (width as usize).saturating_mul(height as usize) <= MAX_GRID_CELLS
}
