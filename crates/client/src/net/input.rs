use gridclaim::{Direction, Tick};

const LOOP: [Direction; 4] = [
    Direction::Right,
    Direction::Down,
    Direction::Left,
    Direction::Up,
];

/// Steers the local player around a square loop so a headless client claims territory.
#[derive(Debug, Clone, Copy)]
pub struct Autopilot {
    leg_ticks: u32,
}

impl Autopilot {
    pub fn new(leg_ticks: u32) -> Self {
        Self {
            leg_ticks: leg_ticks.max(1),
        }
    }

    pub fn direction_at(&self, tick: Tick) -> Direction {
        let leg = (tick / self.leg_ticks) as usize % LOOP.len();
        LOOP[leg]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_loop() {
        let autopilot = Autopilot::new(5);

        assert_eq!(autopilot.direction_at(0), Direction::Right);
        assert_eq!(autopilot.direction_at(4), Direction::Right);
        assert_eq!(autopilot.direction_at(5), Direction::Down);
        assert_eq!(autopilot.direction_at(15), Direction::Up);
        assert_eq!(autopilot.direction_at(20), Direction::Right);
    }

    #[test]
    fn test_zero_leg_is_coerced() {
        let autopilot = Autopilot::new(0);
        assert_eq!(autopilot.direction_at(1), Direction::Down);
    }
}
