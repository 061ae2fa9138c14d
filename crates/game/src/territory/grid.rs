use crate::net::{CellChange, TerritoryRow};
use crate::types::{GridBounds, PlayerId, UNCLAIMED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRecord {
    pub x: i32,
    pub y: i32,
    pub previous_owner: PlayerId,
    pub new_owner: PlayerId,
}

#[derive(Debug, Clone)]
pub struct TerritoryGrid {
    bounds: GridBounds,
    cells: Vec<PlayerId>,
    claimed_cells: usize,
}

impl TerritoryGrid {
    pub fn new(width: u32, height: u32) -> Self {
        let bounds = GridBounds::new(width, height);
        Self {
            bounds,
            cells: vec![UNCLAIMED; bounds.cell_count()],
            claimed_cells: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.bounds.height
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn cells(&self) -> &[PlayerId] {
        &self.cells
    }

    pub fn claimed_cells(&self) -> usize {
        self.claimed_cells
    }

    pub fn owner_at(&self, x: i32, y: i32) -> Option<PlayerId> {
        self.bounds.index(x, y).map(|i| self.cells[i])
    }

    pub fn owned_cells(&self, player: PlayerId) -> usize {
        if player == UNCLAIMED {
            return 0;
        }
        self.cells.iter().filter(|&&owner| owner == player).count()
    }

    /// Replaces the whole grid. Rows missing from `rows` are treated as empty.
    pub fn apply_full_state(&mut self, rows: &[TerritoryRow]) -> Vec<ChangeRecord> {
        let width = self.bounds.width as usize;
        let mut decoded = vec![UNCLAIMED; self.cells.len()];

        for row in rows {
            if row.y >= self.bounds.height {
                log::warn!(
                    "Dropping territory row y={} outside {}x{} grid",
                    row.y,
                    self.bounds.width,
                    self.bounds.height
                );
                continue;
            }

            let row_start = row.y as usize * width;
            let row_cells = &mut decoded[row_start..row_start + width];
            row_cells.fill(UNCLAIMED);

            let mut x = 0usize;
            for run in &row.runs {
                if x >= width {
                    break;
                }
                let end = (x + run.count as usize).min(width);
                row_cells[x..end].fill(run.owner_id);
                x = end;
            }
        }

        let mut changes = Vec::new();
        for (index, (&previous, &next)) in self.cells.iter().zip(decoded.iter()).enumerate() {
            if previous != next {
                changes.push(ChangeRecord {
                    x: (index % width) as i32,
                    y: (index / width) as i32,
                    previous_owner: previous,
                    new_owner: next,
                });
            }
        }

        self.cells = decoded;
        self.claimed_cells = self.cells.iter().filter(|&&c| c != UNCLAIMED).count();

        changes
    }

    pub fn apply_delta_changes(&mut self, cells: &[CellChange]) -> Vec<ChangeRecord> {
        let mut changes = Vec::with_capacity(cells.len());

        for cell in cells {
            let Some(index) = self.bounds.index(cell.x, cell.y) else {
                log::warn!(
                    "Dropping out-of-bounds territory cell ({}, {})",
                    cell.x,
                    cell.y
                );
                continue;
            };

            let previous = self.cells[index];
            if previous == cell.owner_id {
                continue;
            }

            self.cells[index] = cell.owner_id;
            if previous == UNCLAIMED {
                self.claimed_cells += 1;
            } else if cell.owner_id == UNCLAIMED {
                self.claimed_cells -= 1;
            }

            changes.push(ChangeRecord {
                x: cell.x,
                y: cell.y,
                previous_owner: previous,
                new_owner: cell.owner_id,
            });
        }

        changes
    }

    pub fn get_ownership_percentage(&self, player: PlayerId) -> f32 {
        let total = self.cells.len();
        if total == 0 || player == UNCLAIMED {
            return 0.0;
        }
        100.0 * self.owned_cells(player) as f32 / total as f32
    }

    pub fn clear(&mut self) -> Vec<ChangeRecord> {
        let width = self.bounds.width as usize;
        let mut changes = Vec::with_capacity(self.claimed_cells);

        for (index, cell) in self.cells.iter_mut().enumerate() {
            if *cell != UNCLAIMED {
                changes.push(ChangeRecord {
                    x: (index % width) as i32,
                    y: (index / width) as i32,
                    previous_owner: *cell,
                    new_owner: UNCLAIMED,
                });
                *cell = UNCLAIMED;
            }
        }
        self.claimed_cells = 0;

        changes
    }
}
