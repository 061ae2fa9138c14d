use std::collections::VecDeque;

use gridclaim::{Direction, GridBounds, GridPosition, Tick};

pub const DEFAULT_MAX_PENDING_INPUTS: usize = 60;
pub const DEFAULT_MOVE_INTERVAL_TICKS: u32 = 3;

#[derive(Debug, Clone)]
pub struct PredictionConfig {
    pub move_interval_ticks: u32,
    pub max_pending_inputs: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            move_interval_ticks: DEFAULT_MOVE_INTERVAL_TICKS,
            max_pending_inputs: DEFAULT_MAX_PENDING_INPUTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInput {
    pub tick: Tick,
    pub direction: Direction,
    pub position_at_issue: GridPosition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionStats {
    pub total: u64,
    /// Corrections where the predicted cell was more than one cell off.
    pub significant: u64,
}

pub struct PredictionEngine {
    bounds: GridBounds,
    max_pending: usize,
    move_interval: u32,
    position: GridPosition,
    direction: Direction,
    move_timer: u32,
    pending_inputs: VecDeque<PendingInput>,
    corrections: CorrectionStats,
}

impl PredictionEngine {
    pub fn new(bounds: GridBounds, config: &PredictionConfig) -> Self {
        Self {
            bounds,
            max_pending: config.max_pending_inputs.max(1),
            move_interval: config.move_interval_ticks.max(1),
            position: GridPosition::default(),
            direction: Direction::None,
            move_timer: 0,
            pending_inputs: VecDeque::with_capacity(config.max_pending_inputs),
            corrections: CorrectionStats::default(),
        }
    }

    pub fn initialize(&mut self, position: GridPosition, direction: Direction) {
        self.position = self.bounds.clamp(position);
        self.direction = direction;
        self.pending_inputs.clear();
        self.move_timer = self.move_interval - 1;
    }

    pub fn set_bounds(&mut self, bounds: GridBounds) {
        self.bounds = bounds;
        self.position = bounds.clamp(self.position);
    }

    pub fn set_move_interval(&mut self, ticks: u32) {
        self.move_interval = ticks.max(1);
        self.move_timer = 0;
    }

    pub fn record_input(&mut self, direction: Direction, estimated_tick: Tick) {
        self.direction = direction;
        self.pending_inputs.push_back(PendingInput {
            tick: estimated_tick,
            direction,
            position_at_issue: self.position,
        });

        while self.pending_inputs.len() > self.max_pending {
            self.pending_inputs.pop_front();
        }
    }

    pub fn advance(&mut self, _estimated_tick: Tick) {
        if !self.direction.is_moving() {
            return;
        }

        if self.move_timer > 0 {
            self.move_timer -= 1;
            return;
        }

        self.position = self.step(self.position, self.direction);
        self.move_timer = self.move_interval - 1;
    }

    /// Returns `true` when the prediction had to be corrected.
    pub fn reconcile(
        &mut self,
        server_tick: Tick,
        server_position: GridPosition,
        server_direction: Direction,
    ) -> bool {
        while self
            .pending_inputs
            .front()
            .is_some_and(|input| input.tick <= server_tick)
        {
            self.pending_inputs.pop_front();
        }

        let error = self.position.manhattan_distance(server_position);

        if error == 0 {
            if self.direction != server_direction {
                self.direction = server_direction;
            }
            return false;
        }

        self.corrections.total += 1;
        if error > 1 {
            self.corrections.significant += 1;
            log::debug!(
                "Prediction off by {} cells at tick {}: predicted {:?}, server {:?}",
                error,
                server_tick,
                self.position,
                server_position
            );
        }

        self.position = self.bounds.clamp(server_position);
        self.direction = server_direction;
        self.move_timer = 0;

        for input in &self.pending_inputs {
            self.direction = input.direction;
            self.position = self.step(self.position, input.direction);
        }

        true
    }

    fn step(&self, position: GridPosition, direction: Direction) -> GridPosition {
        self.bounds.clamp(position.step(direction))
    }

    pub fn predicted_position(&self) -> GridPosition {
        self.position
    }

    pub fn predicted_direction(&self) -> Direction {
        self.direction
    }

    pub fn move_interval(&self) -> u32 {
        self.move_interval
    }

    pub fn pending_input_count(&self) -> usize {
        self.pending_inputs.len()
    }

    pub fn pending_inputs(&self) -> impl Iterator<Item = &PendingInput> {
        self.pending_inputs.iter()
    }

    pub fn corrections(&self) -> CorrectionStats {
        self.corrections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(move_interval: u32) -> PredictionEngine {
        PredictionEngine::new(
            GridBounds::new(20, 20),
            &PredictionConfig {
                move_interval_ticks: move_interval,
                max_pending_inputs: 60,
            },
        )
    }

    #[test]
    fn test_moves_once_per_interval() {
        let mut prediction = engine(3);
        prediction.initialize(GridPosition::new(0, 0), Direction::Right);

        for tick in 1..=3 {
            prediction.advance(tick);
        }
        assert_eq!(prediction.predicted_position(), GridPosition::new(1, 0));

        for tick in 4..=6 {
            prediction.advance(tick);
        }
        assert_eq!(prediction.predicted_position(), GridPosition::new(2, 0));
    }

    #[test]
    fn test_zero_error_reconcile() {
        let mut prediction = engine(3);
        prediction.initialize(GridPosition::new(0, 0), Direction::Right);

        for tick in 1..=3 {
            prediction.advance(tick);
        }

        let corrected = prediction.reconcile(3, GridPosition::new(1, 0), Direction::Right);

        assert!(!corrected);
        assert_eq!(prediction.predicted_position(), GridPosition::new(1, 0));
        assert_eq!(prediction.corrections(), CorrectionStats::default());
    }

    #[test]
    fn test_zero_error_adopts_server_direction() {
        let mut prediction = engine(3);
        prediction.initialize(GridPosition::new(4, 4), Direction::Right);

        let corrected = prediction.reconcile(1, GridPosition::new(4, 4), Direction::Down);

        assert!(!corrected);
        assert_eq!(prediction.predicted_direction(), Direction::Down);
    }

    #[test]
    fn test_correction_replays_pending_inputs() {
        let mut prediction = engine(3);
        prediction.initialize(GridPosition::new(0, 0), Direction::Right);
        prediction.record_input(Direction::Right, 5);

        prediction.advance(5);
        assert_eq!(prediction.predicted_position(), GridPosition::new(0, 0));

        let corrected = prediction.reconcile(4, GridPosition::new(2, 0), Direction::Right);

        assert!(corrected);
        assert_eq!(prediction.predicted_position(), GridPosition::new(3, 0));
        assert_eq!(prediction.pending_input_count(), 1);
        assert_eq!(prediction.corrections().total, 1);
        assert_eq!(prediction.corrections().significant, 1);
    }

    #[test]
    fn test_replay_uses_each_input_direction() {
        let mut prediction = engine(2);
        prediction.initialize(GridPosition::new(5, 5), Direction::Right);
        prediction.record_input(Direction::Down, 10);
        prediction.record_input(Direction::Left, 11);

        let corrected = prediction.reconcile(9, GridPosition::new(6, 5), Direction::Right);

        assert!(corrected);
        assert_eq!(prediction.predicted_position(), GridPosition::new(5, 6));
        assert_eq!(prediction.predicted_direction(), Direction::Left);
        assert_eq!(prediction.corrections().significant, 0);
    }

    #[test]
    fn test_acknowledged_inputs_discarded() {
        let mut prediction = engine(3);
        prediction.initialize(GridPosition::new(0, 0), Direction::None);
        prediction.record_input(Direction::Up, 3);
        prediction.record_input(Direction::Left, 4);
        prediction.record_input(Direction::Down, 6);

        prediction.reconcile(4, GridPosition::new(0, 0), Direction::Down);

        let remaining: Vec<Tick> = prediction.pending_inputs().map(|i| i.tick).collect();
        assert_eq!(remaining, vec![6]);
    }

    #[test]
    fn test_pending_inputs_capped() {
        let mut prediction = PredictionEngine::new(
            GridBounds::new(10, 10),
            &PredictionConfig {
                move_interval_ticks: 1,
                max_pending_inputs: 4,
            },
        );

        for tick in 0..10 {
            prediction.record_input(Direction::Up, tick);
        }

        assert_eq!(prediction.pending_input_count(), 4);
        assert_eq!(prediction.pending_inputs().next().map(|i| i.tick), Some(6));
    }

    #[test]
    fn test_stationary_does_not_move() {
        let mut prediction = engine(1);
        prediction.initialize(GridPosition::new(3, 3), Direction::None);

        for tick in 0..5 {
            prediction.advance(tick);
        }

        assert_eq!(prediction.predicted_position(), GridPosition::new(3, 3));
    }

    #[test]
    fn test_movement_clamped_to_bounds() {
        let mut prediction = engine(1);
        prediction.initialize(GridPosition::new(19, 0), Direction::Right);

        for tick in 0..5 {
            prediction.advance(tick);
        }
        assert_eq!(prediction.predicted_position(), GridPosition::new(19, 0));

        prediction.record_input(Direction::Up, 6);
        prediction.advance(6);
        assert_eq!(prediction.predicted_position(), GridPosition::new(19, 0));
    }

    #[test]
    fn test_set_move_interval_moves_next_advance() {
        let mut prediction = engine(4);
        prediction.initialize(GridPosition::new(0, 0), Direction::Down);

        prediction.set_move_interval(2);
        prediction.advance(1);

        assert_eq!(prediction.predicted_position(), GridPosition::new(0, 1));
        assert_eq!(prediction.move_interval(), 2);
    }
}
