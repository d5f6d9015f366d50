//! Local intent prediction (spec §4.9). Validates purely against the
//! client's cached board — wall and bounds checks only; player collisions
//! are optimistic and left for the server/reconciler to correct.

use protocol::{BoardDto, PlayerDto};

pub struct Prediction {
    enabled: bool,
    player_id: Option<String>,
    predicted: Option<(u32, u32)>,
    board: Option<BoardDto>,
}

impl Prediction {
    pub fn new(enabled: bool) -> Self {
        Prediction {
            enabled,
            player_id: None,
            predicted: None,
            board: None,
        }
    }

    pub fn set_board(&mut self, board: BoardDto) {
        self.board = Some(board);
    }

    pub fn bind(&mut self, player_id: String, position: (u32, u32)) {
        self.player_id = Some(player_id);
        self.predicted = Some(position);
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn predicted_position(&self) -> Option<(u32, u32)> {
        self.predicted
    }

    /// Returns the new predicted cell if the move is locally acceptable.
    pub fn try_move(&mut self, dx: i8, dy: i8) -> Option<(u32, u32)> {
        if !self.enabled {
            return None;
        }
        let (x, y) = self.predicted?;
        let board = self.board.as_ref()?;

        let nx = x as i64 + dx as i64;
        let ny = y as i64 + dy as i64;
        if nx < 0 || ny < 0 || nx as u32 >= board.width || ny as u32 >= board.height {
            return None;
        }
        let index = (ny as u32 * board.width + nx as u32) as usize;
        if board.grid.get(index).copied().unwrap_or(false) {
            return None;
        }

        let next = (nx as u32, ny as u32);
        self.predicted = Some(next);
        Some(next)
    }

    /// Compares the predicted position against the local player's position
    /// in the most recent snapshot. Returns `Some(server_position)` when a
    /// correction is needed.
    pub fn reconcile(&mut self, players: &[PlayerDto]) -> Option<(u32, u32)> {
        let player_id = self.player_id.as_ref()?;
        let server = players.iter().find(|p| &p.player_id == player_id)?;
        let server_position = (server.x, server.y);
        if self.predicted != Some(server_position) {
            let previous = self.predicted;
            self.predicted = Some(server_position);
            previous.map(|_| server_position)
        } else {
            None
        }
    }

    /// Forgets the bound player and predicted position (spec §4.8: fired
    /// on a server-restart masquerade so the next snapshot starts fresh).
    pub fn reset(&mut self) {
        self.player_id = None;
        self.predicted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_board() -> BoardDto {
        BoardDto {
            width: 5,
            height: 5,
            grid: vec![false; 25],
        }
    }

    #[test]
    fn refuses_to_predict_off_the_board() {
        let mut prediction = Prediction::new(true);
        prediction.set_board(open_board());
        prediction.bind("p1".into(), (0, 0));
        assert_eq!(prediction.try_move(-1, 0), None);
    }

    #[test]
    fn refuses_to_predict_into_a_wall() {
        let mut prediction = Prediction::new(true);
        let mut board = open_board();
        board.grid[1] = true; // (1,0) is a wall
        prediction.set_board(board);
        prediction.bind("p1".into(), (0, 0));
        assert_eq!(prediction.try_move(1, 0), None);
    }

    #[test]
    fn accepts_an_open_move_optimistically() {
        let mut prediction = Prediction::new(true);
        prediction.set_board(open_board());
        prediction.bind("p1".into(), (0, 0));
        assert_eq!(prediction.try_move(1, 0), Some((1, 0)));
    }

    #[test]
    fn reconcile_snaps_to_server_position_on_divergence() {
        let mut prediction = Prediction::new(true);
        prediction.set_board(open_board());
        prediction.bind("p1".into(), (1, 0));
        let players = vec![PlayerDto { player_id: "p1".into(), x: 0, y: 0, player_name: "A".into() }];
        assert_eq!(prediction.reconcile(&players), Some((0, 0)));
        assert_eq!(prediction.predicted_position(), Some((0, 0)));
    }
}
