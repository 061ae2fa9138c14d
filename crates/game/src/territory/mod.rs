mod grid;

pub use grid::{ChangeRecord, TerritoryGrid};
