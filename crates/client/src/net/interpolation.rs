use glam::Vec2;

use gridclaim::{Direction, GridPosition, Tick};

pub const DEFAULT_RENDER_DELAY_TICKS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    pub capacity: usize,
    pub render_delay_ticks: f64,
    pub max_extrapolation_ticks: f64,
    pub tick_duration_secs: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            render_delay_ticks: DEFAULT_RENDER_DELAY_TICKS,
            max_extrapolation_ticks: 3.0,
            tick_duration_secs: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySnapshot {
    pub tick: Tick,
    pub position: Vec2,
    pub direction: Direction,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatedState {
    pub position: Vec2,
    pub direction: Direction,
    pub alive: bool,
    pub is_extrapolating: bool,
}

impl From<&EntitySnapshot> for InterpolatedState {
    fn from(snapshot: &EntitySnapshot) -> Self {
        Self {
            position: snapshot.position,
            direction: snapshot.direction,
            alive: snapshot.alive,
            is_extrapolating: false,
        }
    }
}

pub fn grid_to_world(position: GridPosition) -> Vec2 {
    Vec2::new(position.x as f32, position.y as f32)
}

#[derive(Debug, Clone)]
pub struct InterpolationBuffer {
    config: InterpolationConfig,
    slots: Vec<Option<EntitySnapshot>>,
    next_slot: usize,
    len: usize,
    latest_tick: Option<Tick>,
}

impl InterpolationBuffer {
    pub fn new(config: InterpolationConfig) -> Self {
        let capacity = config.capacity.max(2);
        Self {
            config,
            slots: vec![None; capacity],
            next_slot: 0,
            len: 0,
            latest_tick: None,
        }
    }

    /// Returns `false` if `tick` is not newer than the latest stored snapshot.
    pub fn add_snapshot(
        &mut self,
        tick: Tick,
        position: Vec2,
        direction: Direction,
        alive: bool,
    ) -> bool {
        if self.latest_tick.is_some_and(|latest| tick <= latest) {
            return false;
        }

        self.slots[self.next_slot] = Some(EntitySnapshot {
            tick,
            position,
            direction,
            alive,
        });
        self.next_slot = (self.next_slot + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
        self.latest_tick = Some(tick);

        true
    }

    pub fn sample(&self, tick_progress: f32) -> Option<InterpolatedState> {
        let latest = self.latest_tick?;
        let render_tick = latest as f64 - self.config.render_delay_ticks
            + tick_progress.clamp(0.0, 1.0) as f64;
        self.sample_at(render_tick)
    }

    pub fn sample_at(&self, render_tick: f64) -> Option<InterpolatedState> {
        match self.len {
            0 => return None,
            1 => return self.snapshots().next().map(InterpolatedState::from),
            _ => {}
        }

        let mut before: Option<&EntitySnapshot> = None;
        let mut after: Option<&EntitySnapshot> = None;

        for snapshot in self.snapshots() {
            if snapshot.tick as f64 <= render_tick {
                if before.is_none_or(|b| snapshot.tick > b.tick) {
                    before = Some(snapshot);
                }
            } else if after.is_none_or(|a| snapshot.tick < a.tick) {
                after = Some(snapshot);
            }
        }

        match (before, after) {
            (Some(from), Some(to)) => {
                let span = (to.tick - from.tick) as f64;
                let t = ((render_tick - from.tick as f64) / span).clamp(0.0, 1.0) as f32;
                let closer = if t < 0.5 { from } else { to };

                Some(InterpolatedState {
                    position: from.position.lerp(to.position, t),
                    direction: closer.direction,
                    alive: to.alive,
                    is_extrapolating: false,
                })
            }
            (Some(from), None) => Some(self.extrapolate(from, render_tick)),
            (None, Some(to)) => Some(InterpolatedState::from(to)),
            (None, None) => None,
        }
    }

    fn extrapolate(&self, from: &EntitySnapshot, render_tick: f64) -> InterpolatedState {
        let ticks_past = render_tick - from.tick as f64;
        let mut state = InterpolatedState::from(from);

        if ticks_past <= 0.0 {
            return state;
        }
        state.is_extrapolating = true;

        if ticks_past > self.config.max_extrapolation_ticks || !from.alive {
            return state;
        }

        let elapsed_secs = ticks_past * self.config.tick_duration_secs;
        state.position += self.estimate_velocity() * elapsed_secs as f32;
        state
    }

    /// World units per second between the two newest snapshots.
    fn estimate_velocity(&self) -> Vec2 {
        let mut newest: Option<&EntitySnapshot> = None;
        let mut previous: Option<&EntitySnapshot> = None;

        for snapshot in self.snapshots() {
            if newest.is_none_or(|n| snapshot.tick > n.tick) {
                previous = newest;
                newest = Some(snapshot);
            } else if previous.is_none_or(|p| snapshot.tick > p.tick) {
                previous = Some(snapshot);
            }
        }

        match (previous, newest) {
            (Some(p), Some(n)) if n.tick > p.tick => {
                let secs = (n.tick - p.tick) as f64 * self.config.tick_duration_secs;
                if secs <= 0.0 {
                    return Vec2::ZERO;
                }
                (n.position - p.position) / secs as f32
            }
            _ => Vec2::ZERO,
        }
    }

    fn snapshots(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn latest(&self) -> Option<&EntitySnapshot> {
        let latest = self.latest_tick?;
        self.snapshots().find(|s| s.tick == latest)
    }

    pub fn latest_tick(&self) -> Option<Tick> {
        self.latest_tick
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.next_slot = 0;
        self.len = 0;
        self.latest_tick = None;
    }
}
