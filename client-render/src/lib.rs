//! Incremental renderer driver (spec §4.10).
//!
//! The driver never touches a terminal directly — actual cursor control and
//! ANSI output are out of scope and live behind [`Surface`], the narrow
//! interface the driver consumes. [`terminal::CrosstermSurface`] is one
//! concrete implementation; a test double implementing the same trait is
//! enough to exercise the diff algorithm without a real screen.

mod terminal;

pub use terminal::{CrosstermSurface, DEFAULT_STATUS_BAR_THRESHOLD};

use protocol::GameStateDto;

/// The board/entity/player painting surface the driver drives.
pub trait Surface {
    fn render_full(&mut self, snapshot: &GameStateDto) -> Result<(), SurfaceError>;
    fn paint_cell(&mut self, x: u32, y: u32, glyph: char, color: Option<&str>) -> Result<(), SurfaceError>;
    /// `board_width` lets the surface pick one-line vs. two-line status
    /// layout on its own cutoff (spec's `statusBar.threshold`).
    fn update_status(&mut self, score: i64, board_width: u32) -> Result<(), SurfaceError>;
}

#[derive(Debug, thiserror::Error)]
#[error("surface operation failed: {0}")]
pub struct SurfaceError(pub String);

/// How many diffed primitives trigger a full redraw instead (spec §4.10).
const DEFAULT_FALLBACK_THRESHOLD: usize = 10;

pub struct RenderDriver<S: Surface> {
    surface: S,
    previous: Option<GameStateDto>,
    fallback_threshold: usize,
}

impl<S: Surface> RenderDriver<S> {
    pub fn new(surface: S) -> Self {
        RenderDriver {
            surface,
            previous: None,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }

    pub fn with_fallback_threshold(mut self, threshold: usize) -> Self {
        self.fallback_threshold = threshold;
        self
    }

    /// Feeds one authoritative snapshot through the driver.
    pub fn on_snapshot(&mut self, snapshot: GameStateDto) {
        let Some(previous) = self.previous.take() else {
            self.full_redraw(snapshot);
            return;
        };

        let diff = Diff::compute(&previous, &snapshot);
        if diff.primitive_count() > self.fallback_threshold {
            self.full_redraw(snapshot);
            return;
        }

        match self.apply_incremental(&previous, &snapshot, &diff) {
            Ok(()) => self.previous = Some(snapshot),
            Err(error) => {
                tracing::warn!(%error, "incremental render step failed, falling back to full redraw");
                self.full_redraw(snapshot);
            }
        }
    }

    /// Clears a player's old cell to whatever the last snapshot actually
    /// shows there and draws it at the new cell. The same two-step repaint
    /// serves both immediate local-prediction painting (spec §4.9 point 1)
    /// and the reconciliation snap (spec §4.9 point 2) — only the caller's
    /// notion of "new position" differs (locally predicted vs.
    /// server-confirmed).
    pub fn move_player(&mut self, player_name: &str, old: (u32, u32), new: (u32, u32)) {
        let Some(current) = self.previous.as_ref() else { return };
        let underlying = underlying_glyph(current, old.0, old.1);
        if let Err(error) = self.surface.paint_cell(old.0, old.1, underlying, None) {
            tracing::warn!(%error, "clearing the old player cell failed");
            return;
        }
        if let Err(error) = self.surface.paint_cell(new.0, new.1, player_glyph(player_name), None) {
            tracing::warn!(%error, "drawing the player's new cell failed");
        }
    }

    fn full_redraw(&mut self, snapshot: GameStateDto) {
        match self.surface.render_full(&snapshot) {
            Ok(()) => self.previous = Some(snapshot),
            Err(error) => {
                tracing::error!(%error, "full redraw failed, forgetting remembered snapshot");
                self.previous = None;
            }
        }
    }

    fn apply_incremental(
        &mut self,
        previous: &GameStateDto,
        current: &GameStateDto,
        diff: &Diff,
    ) -> Result<(), SurfaceError> {
        for player_id in &diff.players_left {
            let Some(player) = previous.players.iter().find(|p| &p.player_id == player_id) else {
                continue;
            };
            let glyph = underlying_glyph(current, player.x, player.y);
            self.surface.paint_cell(player.x, player.y, glyph, None)?;
        }

        for player_id in &diff.players_moved {
            let old = previous.players.iter().find(|p| &p.player_id == player_id);
            let new = current.players.iter().find(|p| &p.player_id == player_id);
            if let (Some(old), Some(new)) = (old, new) {
                let glyph = underlying_glyph(current, old.x, old.y);
                self.surface.paint_cell(old.x, old.y, glyph, None)?;
                self.surface
                    .paint_cell(new.x, new.y, player_glyph(&new.player_name), None)?;
            }
        }

        for player_id in &diff.players_joined {
            if let Some(player) = current.players.iter().find(|p| &p.player_id == player_id) {
                self.surface
                    .paint_cell(player.x, player.y, player_glyph(&player.player_name), None)?;
            }
        }

        for entity_id in &diff.entities_despawned {
            let Some(entity) = previous.entities.iter().find(|e| &e.entity_id == entity_id) else {
                continue;
            };
            let glyph = underlying_glyph(current, entity.x, entity.y);
            self.surface.paint_cell(entity.x, entity.y, glyph, None)?;
        }

        for entity_id in &diff.entities_moved {
            let old = previous.entities.iter().find(|e| &e.entity_id == entity_id);
            let new = current.entities.iter().find(|e| &e.entity_id == entity_id);
            if let (Some(old), Some(new)) = (old, new) {
                let glyph = underlying_glyph(current, old.x, old.y);
                self.surface.paint_cell(old.x, old.y, glyph, None)?;
                self.surface.paint_cell(
                    new.x,
                    new.y,
                    entity_glyph(&new.glyph),
                    new.color.as_deref(),
                )?;
            }
        }

        for entity_id in &diff.entities_spawned {
            if let Some(entity) = current.entities.iter().find(|e| &e.entity_id == entity_id) {
                self.surface.paint_cell(
                    entity.x,
                    entity.y,
                    entity_glyph(&entity.glyph),
                    entity.color.as_deref(),
                )?;
            }
        }

        for entity_id in &diff.entities_animated {
            if let Some(entity) = current.entities.iter().find(|e| &e.entity_id == entity_id) {
                self.surface.paint_cell(
                    entity.x,
                    entity.y,
                    entity_glyph(&entity.glyph),
                    entity.color.as_deref(),
                )?;
            }
        }

        if previous.score != current.score {
            self.surface.update_status(current.score, current.board.width)?;
        }

        Ok(())
    }
}

fn player_glyph(name: &str) -> char {
    name.chars().next().map(|c| c.to_ascii_uppercase()).unwrap_or('@')
}

fn entity_glyph(glyph: &str) -> char {
    glyph.chars().next().unwrap_or('?')
}

/// What a cell should look like once whatever used to occupy it is gone:
/// another player or entity at the same position in `current` wins, else
/// the underlying board cell.
fn underlying_glyph(current: &GameStateDto, x: u32, y: u32) -> char {
    if let Some(player) = current.players.iter().find(|p| p.x == x && p.y == y) {
        return player_glyph(&player.player_name);
    }
    if let Some(entity) = current.entities.iter().find(|e| e.x == x && e.y == y) {
        return entity_glyph(&entity.glyph);
    }
    let index = (y * current.board.width + x) as usize;
    if current.board.grid.get(index).copied().unwrap_or(false) {
        '#'
    } else {
        ' '
    }
}

struct Diff {
    players_moved: Vec<String>,
    players_joined: Vec<String>,
    players_left: Vec<String>,
    entities_moved: Vec<String>,
    entities_spawned: Vec<String>,
    entities_despawned: Vec<String>,
    entities_animated: Vec<String>,
}

impl Diff {
    fn compute(previous: &GameStateDto, current: &GameStateDto) -> Self {
        let mut players_moved = Vec::new();
        let mut players_left = Vec::new();
        for old in &previous.players {
            match current.players.iter().find(|p| p.player_id == old.player_id) {
                Some(new) if new.x != old.x || new.y != old.y => players_moved.push(old.player_id.clone()),
                Some(_) => {}
                None => players_left.push(old.player_id.clone()),
            }
        }
        let players_joined = current
            .players
            .iter()
            .filter(|p| !previous.players.iter().any(|old| old.player_id == p.player_id))
            .map(|p| p.player_id.clone())
            .collect();

        let mut entities_moved = Vec::new();
        let mut entities_animated = Vec::new();
        let mut entities_despawned = Vec::new();
        for old in &previous.entities {
            match current.entities.iter().find(|e| e.entity_id == old.entity_id) {
                Some(new) if new.x != old.x || new.y != old.y => entities_moved.push(old.entity_id.clone()),
                Some(new) if new.glyph != old.glyph || new.animation_frame != old.animation_frame => {
                    entities_animated.push(old.entity_id.clone())
                }
                Some(_) => {}
                None => entities_despawned.push(old.entity_id.clone()),
            }
        }
        let entities_spawned = current
            .entities
            .iter()
            .filter(|e| !previous.entities.iter().any(|old| old.entity_id == e.entity_id))
            .map(|e| e.entity_id.clone())
            .collect();

        Diff {
            players_moved,
            players_joined,
            players_left,
            entities_moved,
            entities_spawned,
            entities_despawned,
            entities_animated,
        }
    }

    fn primitive_count(&self) -> usize {
        self.players_moved.len()
            + self.players_joined.len()
            + self.players_left.len()
            + self.entities_moved.len()
            + self.entities_spawned.len()
            + self.entities_despawned.len()
            + self.entities_animated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{BoardDto, PlayerDto};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSurface {
        full_redraws: RefCell<u32>,
        cells: RefCell<Vec<(u32, u32, char)>>,
        status: RefCell<Option<i64>>,
    }

    impl Surface for RecordingSurface {
        fn render_full(&mut self, _snapshot: &GameStateDto) -> Result<(), SurfaceError> {
            *self.full_redraws.borrow_mut() += 1;
            Ok(())
        }
        fn paint_cell(&mut self, x: u32, y: u32, glyph: char, _color: Option<&str>) -> Result<(), SurfaceError> {
            self.cells.borrow_mut().push((x, y, glyph));
            Ok(())
        }
        fn update_status(&mut self, score: i64, _board_width: u32) -> Result<(), SurfaceError> {
            *self.status.borrow_mut() = Some(score);
            Ok(())
        }
    }

    fn board() -> BoardDto {
        BoardDto {
            width: 10,
            height: 10,
            grid: vec![false; 100],
        }
    }

    fn snapshot(players: Vec<PlayerDto>) -> GameStateDto {
        GameStateDto {
            board: board(),
            players,
            entities: vec![],
            score: 0,
        }
    }

    #[test]
    fn first_snapshot_always_does_a_full_redraw() {
        let mut driver = RenderDriver::new(RecordingSurface::default());
        driver.on_snapshot(snapshot(vec![]));
        assert_eq!(*driver.surface.full_redraws.borrow(), 1);
    }

    #[test]
    fn a_single_player_move_emits_clear_and_draw() {
        let mut driver = RenderDriver::new(RecordingSurface::default());
        let p = PlayerDto { player_id: "p1".into(), x: 3, y: 3, player_name: "Alice".into() };
        driver.on_snapshot(snapshot(vec![p]));

        let moved = PlayerDto { player_id: "p1".into(), x: 4, y: 3, player_name: "Alice".into() };
        driver.on_snapshot(snapshot(vec![moved]));

        assert_eq!(*driver.surface.full_redraws.borrow(), 1);
        let cells = driver.surface.cells.borrow();
        assert_eq!(&*cells, &[(3, 3, ' '), (4, 3, 'A')]);
    }

    #[test]
    fn exceeding_the_fallback_threshold_forces_a_full_redraw() {
        let mut driver = RenderDriver::new(RecordingSurface::default()).with_fallback_threshold(2);
        let before: Vec<PlayerDto> = (0..5)
            .map(|i| PlayerDto { player_id: format!("p{i}"), x: i, y: 0, player_name: "X".into() })
            .collect();
        driver.on_snapshot(snapshot(before));

        let after: Vec<PlayerDto> = (0..5)
            .map(|i| PlayerDto { player_id: format!("p{i}"), x: i, y: 1, player_name: "X".into() })
            .collect();
        driver.on_snapshot(snapshot(after));

        assert_eq!(*driver.surface.full_redraws.borrow(), 2);
    }
}
