//! The immutable playfield grid and the spawn-allocation rule built on top
//! of it.
//!
//! Construction happens once per game session (driven by a map loader that
//! is out of scope for this crate — see `spec.md` §2); afterwards a [`Board`]
//! is read-only and safely shared across every concurrent consumer via
//! `Arc<Board>`.

pub mod spawn;

use serde::{Deserialize, Serialize};

/// The kind of one board cell. The source loader may additionally mark
/// cells as spawn points (see [`SourceCell`]); a `Spawn` source cell still
/// becomes `Empty` in the constructed [`Board`] — spawn-ness lives only in
/// [`Board::spawns`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Empty,
    Wall,
}

/// What the (out-of-scope) map loader hands us for one cell before spawn
/// derivation collapses `Spawn` into `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCell {
    Empty,
    Wall,
    Spawn,
}

impl From<SourceCell> for CellKind {
    fn from(value: SourceCell) -> Self {
        match value {
            SourceCell::Wall => CellKind::Wall,
            SourceCell::Empty | SourceCell::Spawn => CellKind::Empty,
        }
    }
}

/// One board coordinate, used for spawns, player positions and entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    pub fn new(x: u32, y: u32) -> Self {
        Coord { x, y }
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan_distance(&self, other: &Coord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("grid has {expected} cells for a {width}x{height} board, got {actual}")]
    GridSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("explicit spawn {0:?} does not fall within the board bounds")]
    SpawnOutOfBounds(Coord),
    #[error("explicit spawn {0:?} is not an empty cell")]
    SpawnNotEmpty(Coord),
}

/// Default cap on the number of retained spawn points (spec §3, §6
/// `spawnPoints.maxCount`).
pub const DEFAULT_MAX_SPAWN_POINTS: usize = 25;

/// An immutable grid: width, height, per-cell kind, and an ordered spawn
/// list. Everything here is O(1) after construction.
#[derive(Debug, Clone)]
pub struct Board {
    width: u32,
    height: u32,
    cells: Vec<CellKind>,
    spawns: Vec<Coord>,
}

impl Board {
    /// Builds a board from a row-major source grid. If `explicit_spawns` is
    /// `None`, spawns are derived by scanning `source` for `SourceCell::Spawn`
    /// markers in row-major order. Either way the resulting list is capped at
    /// `max_spawns`, retaining the first N in row-major order (spec §3).
    pub fn from_source(
        width: u32,
        height: u32,
        source: Vec<SourceCell>,
        explicit_spawns: Option<Vec<Coord>>,
        max_spawns: usize,
    ) -> Result<Board, BoardError> {
        let expected = (width as usize) * (height as usize);
        if source.len() != expected {
            return Err(BoardError::GridSizeMismatch {
                width,
                height,
                expected,
                actual: source.len(),
            });
        }

        let cells: Vec<CellKind> = source.iter().copied().map(CellKind::from).collect();

        let mut spawns = match explicit_spawns {
            Some(list) => list,
            None => source
                .iter()
                .enumerate()
                .filter(|(_, cell)| matches!(cell, SourceCell::Spawn))
                .map(|(idx, _)| Coord::new((idx as u32) % width, (idx as u32) / width))
                .collect(),
        };

        for &coord in &spawns {
            if coord.x >= width || coord.y >= height {
                return Err(BoardError::SpawnOutOfBounds(coord));
            }
            let idx = (coord.y * width + coord.x) as usize;
            if cells[idx] != CellKind::Empty {
                return Err(BoardError::SpawnNotEmpty(coord));
            }
        }

        if spawns.len() > max_spawns {
            tracing::warn!(
                found = spawns.len(),
                kept = max_spawns,
                "truncating spawn list to configured maximum"
            );
            spawns.truncate(max_spawns);
        }

        Ok(Board {
            width,
            height,
            cells,
            spawns,
        })
    }

    /// Builds a board straight from a canonical `{empty,wall}` grid, with an
    /// already-resolved spawn list (used by tests and by loaders that
    /// compute spawns themselves).
    pub fn from_cells(
        width: u32,
        height: u32,
        cells: Vec<CellKind>,
        spawns: Vec<Coord>,
    ) -> Result<Board, BoardError> {
        let expected = (width as usize) * (height as usize);
        if cells.len() != expected {
            return Err(BoardError::GridSizeMismatch {
                width,
                height,
                expected,
                actual: cells.len(),
            });
        }
        for &coord in &spawns {
            if coord.x >= width || coord.y >= height {
                return Err(BoardError::SpawnOutOfBounds(coord));
            }
            let idx = (coord.y * width + coord.x) as usize;
            if cells[idx] != CellKind::Empty {
                return Err(BoardError::SpawnNotEmpty(coord));
            }
        }
        Ok(Board {
            width,
            height,
            cells,
            spawns,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    pub fn get_cell(&self, coord: Coord) -> Option<CellKind> {
        if !self.in_bounds(coord) {
            return None;
        }
        Some(self.cells[(coord.y * self.width + coord.x) as usize])
    }

    pub fn is_wall(&self, coord: Coord) -> bool {
        matches!(self.get_cell(coord), Some(CellKind::Wall))
    }

    pub fn spawns(&self) -> &[Coord] {
        &self.spawns
    }

    /// Row-major grid of `true` = wall, `false` = empty — the shape the wire
    /// codec's `BoardDto` needs.
    pub fn wall_grid(&self) -> Vec<bool> {
        self.cells.iter().map(|c| *c == CellKind::Wall).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_board() -> Board {
        // 3x3, all empty, spawns at (0,0) and (2,2).
        let cells = vec![CellKind::Empty; 9];
        Board::from_cells(3, 3, cells, vec![Coord::new(0, 0), Coord::new(2, 2)]).unwrap()
    }

    #[test]
    fn in_bounds_and_get_cell() {
        let board = tiny_board();
        assert!(board.in_bounds(Coord::new(2, 2)));
        assert!(!board.in_bounds(Coord::new(3, 0)));
        assert_eq!(board.get_cell(Coord::new(1, 1)), Some(CellKind::Empty));
        assert_eq!(board.get_cell(Coord::new(5, 5)), None);
    }

    #[test]
    fn spawn_list_caps_at_max_in_row_major_order() {
        let mut source = vec![SourceCell::Empty; 9];
        for idx in [0usize, 1, 2, 3, 4] {
            source[idx] = SourceCell::Spawn;
        }
        let board = Board::from_source(3, 3, source, None, 3).unwrap();
        assert_eq!(
            board.spawns(),
            &[Coord::new(0, 0), Coord::new(1, 0), Coord::new(2, 0)]
        );
    }

    #[test]
    fn explicit_spawn_must_be_empty() {
        let mut cells = vec![CellKind::Empty; 9];
        cells[0] = CellKind::Wall;
        let err = Board::from_cells(3, 3, cells, vec![Coord::new(0, 0)]).unwrap_err();
        assert!(matches!(err, BoardError::SpawnNotEmpty(_)));
    }

    #[test]
    fn wall_grid_matches_cells() {
        let mut cells = vec![CellKind::Empty; 9];
        cells[4] = CellKind::Wall;
        let board = Board::from_cells(3, 3, cells, vec![]).unwrap();
        let grid = board.wall_grid();
        assert!(grid[4]);
        assert_eq!(grid.iter().filter(|w| **w).count(), 1);
    }
}
