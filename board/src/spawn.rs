//! Spawn availability and selection (spec §4.3).
//!
//! "Available" means: the spawn cell itself is empty, and no live player
//! occupies a cell within Manhattan distance `clear_radius`. Walls inside the
//! disk never disqualify a spawn — only other players do.

use crate::{Board, CellKind, Coord};

/// Default clear radius (spec §6 `spawnPoints.clearRadius`).
pub const DEFAULT_CLEAR_RADIUS: u32 = 3;

/// Selects spawn points for newly-joining or respawning players.
#[derive(Debug, Clone, Copy)]
pub struct SpawnAllocator {
    clear_radius: u32,
}

impl SpawnAllocator {
    pub fn new(clear_radius: u32) -> Self {
        SpawnAllocator { clear_radius }
    }

    pub fn clear_radius(&self) -> u32 {
        self.clear_radius
    }

    /// Is `candidate` available given the set of currently-occupied cells?
    /// The candidate cell must itself be empty; walls under the clear radius
    /// don't disqualify it, only other occupants do.
    pub fn is_available(&self, board: &Board, occupied: &[Coord], candidate: Coord) -> bool {
        if board.get_cell(candidate) != Some(CellKind::Empty) {
            return false;
        }
        !occupied
            .iter()
            .any(|p| p.manhattan_distance(&candidate) <= self.clear_radius)
    }

    /// Finds a spawn point, or `None` if every known spawn (and fallback
    /// position) is currently disqualified by an occupant. Selection policy
    /// is deterministic: the first available spawn in the board's list
    /// order; if the board has no spawns at all, board center, then a
    /// deterministic spiral scan outward from center.
    pub fn find_available(&self, board: &Board, occupied: &[Coord]) -> Option<Coord> {
        if !board.spawns().is_empty() {
            return board
                .spawns()
                .iter()
                .copied()
                .find(|&spawn| self.is_available(board, occupied, spawn));
        }

        self.fallback_spiral(board, occupied)
    }

    /// Zero-spawn fallback: board center if available, else a deterministic
    /// spiral scan outward from center.
    fn fallback_spiral(&self, board: &Board, occupied: &[Coord]) -> Option<Coord> {
        let center = Coord::new(board.width() / 2, board.height() / 2);
        if self.is_available(board, occupied, center) {
            return Some(center);
        }

        let max_radius = board.width().max(board.height());
        for radius in 1..=max_radius {
            for candidate in spiral_ring(center, radius) {
                if !board.in_bounds(candidate) {
                    continue;
                }
                if self.is_available(board, occupied, candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Deterministic ring of candidate cells at Chebyshev `radius` from `center`,
/// walked clockwise starting due north, as signed coordinates clamped into
/// `u32` space (cells that go negative are simply skipped by the caller's
/// `in_bounds` check).
fn spiral_ring(center: Coord, radius: u32) -> Vec<Coord> {
    let r = radius as i64;
    let cx = center.x as i64;
    let cy = center.y as i64;
    let mut ring = Vec::with_capacity((8 * radius) as usize);

    let to_coord = |x: i64, y: i64| -> Option<Coord> {
        if x < 0 || y < 0 {
            None
        } else {
            Some(Coord::new(x as u32, y as u32))
        }
    };

    for x in (cx - r)..=(cx + r) {
        ring.extend(to_coord(x, cy - r));
        ring.extend(to_coord(x, cy + r));
    }
    for y in (cy - r + 1)..=(cy + r - 1) {
        ring.extend(to_coord(cx - r, y));
        ring.extend(to_coord(cx + r, y));
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellKind;

    fn board_with_spawns(spawns: Vec<Coord>) -> Board {
        let cells = vec![CellKind::Empty; 400]; // 20x20
        Board::from_cells(20, 20, cells, spawns).unwrap()
    }

    #[test]
    fn picks_first_available_spawn_in_list_order() {
        let board = board_with_spawns(vec![Coord::new(1, 1), Coord::new(18, 18)]);
        let allocator = SpawnAllocator::new(DEFAULT_CLEAR_RADIUS);
        let occupied = vec![Coord::new(1, 1)];
        let spawn = allocator.find_available(&board, &occupied).unwrap();
        assert_eq!(spawn, Coord::new(18, 18));
    }

    #[test]
    fn walls_inside_disk_do_not_disqualify_spawn() {
        let mut cells = vec![CellKind::Empty; 400];
        cells[(1 * 20 + 2) as usize] = CellKind::Wall; // wall adjacent to spawn (1,1)
        let board = Board::from_cells(20, 20, cells, vec![Coord::new(1, 1)]).unwrap();
        let allocator = SpawnAllocator::new(DEFAULT_CLEAR_RADIUS);
        assert_eq!(allocator.find_available(&board, &[]), Some(Coord::new(1, 1)));
    }

    #[test]
    fn returns_none_when_all_spawns_are_within_clear_radius_of_a_player() {
        let board = board_with_spawns(vec![Coord::new(0, 0)]);
        let allocator = SpawnAllocator::new(3);
        let occupied = vec![Coord::new(0, 0)];
        assert_eq!(allocator.find_available(&board, &occupied), None);
    }

    #[test]
    fn zero_spawn_board_falls_back_to_center() {
        let cells = vec![CellKind::Empty; 400];
        let board = Board::from_cells(20, 20, cells, vec![]).unwrap();
        let allocator = SpawnAllocator::new(DEFAULT_CLEAR_RADIUS);
        assert_eq!(
            allocator.find_available(&board, &[]),
            Some(Coord::new(10, 10))
        );
    }

    #[test]
    fn zero_spawn_board_spirals_out_when_center_occupied() {
        let cells = vec![CellKind::Empty; 400];
        let board = Board::from_cells(20, 20, cells, vec![]).unwrap();
        let allocator = SpawnAllocator::new(1);
        let occupied = vec![Coord::new(10, 10)];
        let spawn = allocator.find_available(&board, &occupied).unwrap();
        assert!(spawn.manhattan_distance(&Coord::new(10, 10)) >= 2);
    }
}
