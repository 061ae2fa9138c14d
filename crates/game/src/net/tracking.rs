use super::protocol::UNSEQUENCED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Sequence 0; accepted without touching the tracker.
    Unsequenced,
    /// Accepted. `gap` counts the sequences skipped since the last accepted one.
    Accepted { gap: u32 },
    /// Older than expected; the message should be dropped.
    Stale,
}

impl SequenceOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SequenceOutcome::Stale)
    }

    pub fn gap(&self) -> u32 {
        match self {
            SequenceOutcome::Accepted { gap } => *gap,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReceiveTracker {
    last_received: u32,
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_received(&self) -> u32 {
        self.last_received
    }

    pub fn update(&mut self, sequence: u32) -> SequenceOutcome {
        if sequence == UNSEQUENCED {
            return SequenceOutcome::Unsequenced;
        }

        let expected = self.last_received.wrapping_add(1);

        if sequence > expected {
            self.last_received = sequence;
            return SequenceOutcome::Accepted {
                gap: sequence - expected,
            };
        }

        // Sequence 1 is let through so a restarted sender can resynchronise.
        if sequence < expected && sequence != 1 {
            return SequenceOutcome::Stale;
        }

        self.last_received = sequence;
        SequenceOutcome::Accepted { gap: 0 }
    }

    pub fn reset(&mut self) {
        self.last_received = 0;
    }
}

#[derive(Debug)]
pub struct SendSequence {
    next: u32,
}

impl Default for SendSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl SendSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next(&mut self) -> u32 {
        let sequence = self.next;
        self.next = self.next.wrapping_add(1);
        if self.next == UNSEQUENCED {
            self.next = 1;
        }
        sequence
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_detection() {
        let mut tracker = ReceiveTracker::new();

        assert_eq!(tracker.update(1), SequenceOutcome::Accepted { gap: 0 });
        assert_eq!(tracker.update(2), SequenceOutcome::Accepted { gap: 0 });
        assert_eq!(tracker.update(5), SequenceOutcome::Accepted { gap: 2 });
        assert_eq!(tracker.last_received(), 5);
    }

    #[test]
    fn test_stale_rejected() {
        let mut tracker = ReceiveTracker::new();

        tracker.update(5);
        assert_eq!(tracker.update(3), SequenceOutcome::Stale);
        assert_eq!(tracker.last_received(), 5);

        assert_eq!(tracker.update(5), SequenceOutcome::Stale);
        assert_eq!(tracker.last_received(), 5);
    }

    #[test]
    fn test_unsequenced_passes_through() {
        let mut tracker = ReceiveTracker::new();

        tracker.update(4);
        assert_eq!(tracker.update(0), SequenceOutcome::Unsequenced);
        assert!(SequenceOutcome::Unsequenced.is_accepted());
        assert_eq!(tracker.last_received(), 4);
    }

    #[test]
    fn test_sequence_one_resynchronises() {
        let mut tracker = ReceiveTracker::new();

        tracker.update(40);
        assert_eq!(tracker.update(1), SequenceOutcome::Accepted { gap: 0 });
        assert_eq!(tracker.last_received(), 1);
        assert_eq!(tracker.update(2), SequenceOutcome::Accepted { gap: 0 });
    }

    #[test]
    fn test_send_sequence_skips_zero() {
        let mut sequence = SendSequence { next: u32::MAX };

        assert_eq!(sequence.next(), u32::MAX);
        assert_eq!(sequence.next(), 1);
    }
}
