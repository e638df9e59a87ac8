//! World Grid: occupancy matrix with pre-marked wall borders.
//!
//! Queries never fail: any coordinate outside the matrix reports
//! [`CellState::OutOfBounds`], which callers collapse to "occupied".

use crate::player::Direction;

/// Largest supported matrix side.
///
/// Coordinates travel as single bytes and a position frame has no leading
/// tag, so no coordinate may ever equal the removal tag (0x6F = 111).
pub const MAX_SIDE: usize = 111;

/// Smallest matrix that still has an interior cell.
pub const MIN_SIDE: usize = 3;

/// A grid coordinate. Signed so that a step off the edge stays representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one unit in `direction`.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.unit();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl From<(u8, u8)> for Cell {
    fn from((x, y): (u8, u8)) -> Self {
        Self::new(i32::from(x), i32::from(y))
    }
}

/// Typed outcome of a bounds-checked lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    InBounds { occupied: bool },
    OutOfBounds,
}

impl CellState {
    /// Fail-closed collapse: out-of-range reads as a wall.
    pub fn is_blocked(self) -> bool {
        match self {
            Self::InBounds { occupied } => occupied,
            Self::OutOfBounds => true,
        }
    }
}

/// Square occupancy matrix. The border row and column on every side are walls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    side: usize,
    cells: Vec<bool>,
}

impl Grid {
    /// Create a grid with `side` cells per edge, border marked, interior clear.
    ///
    /// # Panics
    /// If `side` is outside `MIN_SIDE..=MAX_SIDE`.
    pub fn new(side: usize) -> Self {
        assert!(
            (MIN_SIDE..=MAX_SIDE).contains(&side),
            "grid side must be within {MIN_SIDE}..={MAX_SIDE}, got {side}"
        );

        let mut cells = vec![false; side * side];
        let last = side - 1;
        for i in 0..side {
            cells[i] = true;
            cells[last * side + i] = true;
            cells[i * side] = true;
            cells[i * side + last] = true;
        }

        Self { side, cells }
    }

    /// Cells per edge.
    pub fn side(&self) -> usize {
        self.side
    }

    pub fn state(&self, cell: Cell) -> CellState {
        match self.index(cell) {
            Some(index) => CellState::InBounds {
                occupied: self.cells[index],
            },
            None => CellState::OutOfBounds,
        }
    }

    /// Whether `cell` blocks movement. Out-of-range cells are occupied.
    pub fn occupied(&self, cell: Cell) -> bool {
        self.state(cell).is_blocked()
    }

    pub fn is_wall(&self, cell: Cell) -> bool {
        let last = self.side as i32 - 1;
        self.index(cell).is_some()
            && (cell.x == 0 || cell.y == 0 || cell.x == last || cell.y == last)
    }

    /// Mark a cell occupied. Returns false when the cell is off the grid.
    pub fn mark(&mut self, cell: Cell) -> bool {
        match self.index(cell) {
            Some(index) => {
                self.cells[index] = true;
                true
            }
            None => false,
        }
    }

    /// Clear a trail cell. Walls and off-grid cells are left untouched.
    pub fn clear(&mut self, cell: Cell) {
        if self.is_wall(cell) {
            return;
        }
        if let Some(index) = self.index(cell) {
            self.cells[index] = false;
        }
    }

    /// Number of occupied cells, walls included.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&occupied| occupied).count()
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        let x = usize::try_from(cell.x).ok()?;
        let y = usize::try_from(cell.y).ok()?;
        (x < self.side && y < self.side).then_some(y * self.side + x)
    }
}
