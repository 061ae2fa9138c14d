mod tick;

pub use tick::{FixedTimestep, TickClock};
