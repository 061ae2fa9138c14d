use crate::types::Tick;

/// Upper bound on frame time fed into the accumulator, so a stalled frame
/// cannot trigger a long burst of catch-up ticks.
const MAX_FRAME_SECS: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.clamp(0.0, MAX_FRAME_SECS);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Fraction of the way to the next tick, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.dt).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// Local estimate of the server's current tick.
#[derive(Debug, Clone, Default)]
pub struct TickClock {
    estimated: Tick,
    last_server_tick: Option<Tick>,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn estimated(&self) -> Tick {
        self.estimated
    }

    pub fn last_server_tick(&self) -> Option<Tick> {
        self.last_server_tick
    }

    pub fn advance(&mut self) -> Tick {
        self.estimated = self.estimated.wrapping_add(1);
        self.estimated
    }

    /// Never moves the estimate backwards; only catches up when the server is ahead.
    pub fn observe_server_tick(&mut self, tick: Tick) {
        self.last_server_tick = Some(tick);
        if tick > self.estimated {
            self.estimated = tick;
        }
    }

    pub fn reset(&mut self) {
        self.estimated = 0;
        self.last_server_tick = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_timestep_accumulation() {
        let mut ts = FixedTimestep::new(10);

        ts.accumulate(0.25);
        assert!(ts.should_tick());
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
        assert!((ts.alpha() - 0.5).abs() < 0.01);
    }

    #[test]
    fn fixed_timestep_caps_long_frames() {
        let mut ts = FixedTimestep::new(10);

        ts.accumulate(5.0);

        let mut ticks = 0;
        while ts.consume_tick() {
            ticks += 1;
        }
        assert!(ticks <= 3);
    }

    #[test]
    fn tick_clock_catches_up_only_forward() {
        let mut clock = TickClock::new();

        clock.observe_server_tick(20);
        assert_eq!(clock.estimated(), 20);

        clock.advance();
        clock.advance();
        clock.observe_server_tick(21);
        assert_eq!(clock.estimated(), 22);
        assert_eq!(clock.last_server_tick(), Some(21));
    }
}
