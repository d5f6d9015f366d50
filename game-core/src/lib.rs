//! Authoritative world state (spec §4.5): players, entities, score. This is
//! the only component allowed to mutate a [`Player`] or [`Entity`] record —
//! the session registry only ever holds ids, per the ownership split in
//! spec §3.

use board::{Board, Coord};
use board::spawn::SpawnAllocator;
use session::PlayerId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub x: u32,
    pub y: u32,
    pub name: String,
}

impl Player {
    pub fn position(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// A passive board object (spec §4.5.1). Optional — present only if the
/// board loader produced any.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub x: u32,
    pub y: u32,
    pub entity_type: String,
    pub glyph: char,
    pub color: Option<String>,
    pub animation_frame: Option<u32>,
    /// Blocks movement like a wall when true. Spec leaves the entity-solid
    /// rejection reason unspecified; this implementation reports it as
    /// `MoveFailReason::Wall` since the wire taxonomy (§6) has no
    /// entity-specific code.
    pub solid: bool,
    /// If set, a player stepping onto this (non-solid) entity collects it:
    /// the entity despawns and score increases by this amount.
    pub score_value: Option<i64>,
}

/// Initial entity placement, supplied by the (out-of-scope) board/map
/// loader at construction time.
#[derive(Debug, Clone)]
pub struct EntitySpawn {
    pub x: u32,
    pub y: u32,
    pub entity_type: String,
    pub glyph: char,
    pub color: Option<String>,
    pub solid: bool,
    pub score_value: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveFailReason {
    OutOfBounds,
    Wall,
    PlayerCollision,
}

impl MoveFailReason {
    pub fn as_wire_code(&self) -> &'static str {
        match self {
            MoveFailReason::OutOfBounds => "OUT_OF_BOUNDS",
            MoveFailReason::Wall => "WALL",
            MoveFailReason::PlayerCollision => "PLAYER_COLLISION",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GameCoreError {
    #[error("no player with id {0} is present")]
    UnknownPlayer(PlayerId),
    #[error("no spawn currently available")]
    NoSpawnAvailable,
}

/// [`GameCore::apply_move`]'s error: a gameplay rejection the caller reports
/// to the client as `MOVE_FAILED`, or an internal invariant violation (the
/// player vanished between the caller's existence check and this call).
#[derive(Debug, thiserror::Error)]
pub enum ApplyMoveError {
    #[error(transparent)]
    Unknown(#[from] GameCoreError),
    #[error("move rejected: {0:?}")]
    Rejected(MoveFailReason),
}

/// Read-only view handed to the broadcast scheduler and, via the wire
/// codec, to clients. Mirrors the `gameState` shape of spec §6 without
/// depending on the `protocol` crate — the `server` crate maps this into
/// wire DTOs.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tick: u64,
    pub board: Arc<Board>,
    pub players: Vec<Player>,
    pub entities: Vec<Entity>,
    pub score: i64,
}

/// Decides whether a `RESTART` request from `requester` is honored (Open
/// Question in spec §9; resolved here as a policy hook). Default policy:
/// any joined client may request a restart.
pub trait RestartPolicy: Send + Sync {
    fn allows_restart(&self, requester: PlayerId) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnyJoinedClient;

impl RestartPolicy for AnyJoinedClient {
    fn allows_restart(&self, _requester: PlayerId) -> bool {
        true
    }
}

/// The authoritative, single-lock-guarded world (spec §5: one exclusive
/// lock per `Game` instance covers every operation here). Callers are
/// expected to hold that lock — this type does no locking of its own.
pub struct GameCore {
    board: Arc<Board>,
    allocator: SpawnAllocator,
    players: HashMap<PlayerId, Player>,
    entities: HashMap<EntityId, Entity>,
    next_entity_id: u64,
    score: i64,
    tick: u64,
}

impl GameCore {
    pub fn new(board: Arc<Board>, allocator: SpawnAllocator, initial_entities: Vec<EntitySpawn>) -> Self {
        let mut entities = HashMap::new();
        let mut next_entity_id = 1;
        for spawn in initial_entities {
            let id = EntityId(next_entity_id);
            next_entity_id += 1;
            entities.insert(
                id,
                Entity {
                    id,
                    x: spawn.x,
                    y: spawn.y,
                    entity_type: spawn.entity_type,
                    glyph: spawn.glyph,
                    color: spawn.color,
                    animation_frame: None,
                    solid: spawn.solid,
                    score_value: spawn.score_value,
                },
            );
        }
        GameCore {
            board,
            allocator,
            players: HashMap::new(),
            entities,
            next_entity_id,
            score: 0,
            tick: 0,
        }
    }

    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    fn occupied_positions(&self) -> Vec<Coord> {
        self.players.values().map(Player::position).collect()
    }

    /// Asks the spawn allocator for a free position. Does not place a
    /// player — callers place on success, or enqueue on `None` (spec §4.3).
    pub fn allocate_spawn(&self) -> Option<Coord> {
        self.allocator.find_available(&self.board, &self.occupied_positions())
    }

    /// Places a (new or reconnecting) player at `position`, which the
    /// caller must already have validated as available.
    pub fn place_player(&mut self, id: PlayerId, name: String, position: Coord) {
        self.players.insert(
            id,
            Player {
                id,
                x: position.x,
                y: position.y,
                name,
            },
        );
    }

    pub fn remove_player(&mut self, id: PlayerId) {
        self.players.remove(&id);
    }

    /// Validates and applies a `MOVE` (spec §4.5). On success returns the
    /// new position; on rejection returns the reason and leaves the
    /// player's position unchanged (invariant 4, spec §8).
    pub fn apply_move(
        &mut self,
        id: PlayerId,
        dx: i32,
        dy: i32,
    ) -> Result<Coord, ApplyMoveError> {
        let current = self
            .players
            .get(&id)
            .map(Player::position)
            .ok_or(GameCoreError::UnknownPlayer(id))?;

        let target_x = current.x as i64 + dx as i64;
        let target_y = current.y as i64 + dy as i64;
        if target_x < 0 || target_y < 0 {
            return Err(ApplyMoveError::Rejected(MoveFailReason::OutOfBounds));
        }
        let target = Coord::new(target_x as u32, target_y as u32);
        if !self.board.in_bounds(target) {
            return Err(ApplyMoveError::Rejected(MoveFailReason::OutOfBounds));
        }
        if self.board.is_wall(target) {
            return Err(ApplyMoveError::Rejected(MoveFailReason::Wall));
        }
        if self
            .entities
            .values()
            .any(|e| e.solid && e.x == target.x && e.y == target.y)
        {
            return Err(ApplyMoveError::Rejected(MoveFailReason::Wall));
        }
        if self
            .players
            .values()
            .any(|p| p.id != id && p.x == target.x && p.y == target.y)
        {
            return Err(ApplyMoveError::Rejected(MoveFailReason::PlayerCollision));
        }

        if let Some(player) = self.players.get_mut(&id) {
            player.x = target.x;
            player.y = target.y;
        }
        self.collect_entity_at(target);
        Ok(target)
    }

    fn collect_entity_at(&mut self, position: Coord) {
        let collected = self
            .entities
            .values()
            .find(|e| !e.solid && e.score_value.is_some() && e.x == position.x && e.y == position.y)
            .map(|e| e.id);
        if let Some(id) = collected {
            if let Some(entity) = self.entities.remove(&id) {
                self.score += entity.score_value.unwrap_or(0);
                tracing::debug!(entity_id = %id, score = self.score, "entity collected");
            }
        }
    }

    /// `RESTART` (spec §4.5): repositions every current player via the
    /// spawn allocator in ascending-id order (deterministic), resets score
    /// to zero, and leaves connections untouched. Players for whom no
    /// spawn is available keep their previous position — exhaustion here
    /// degrades gracefully rather than dropping anyone.
    pub fn restart(&mut self) {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort();
        for id in ids {
            let occupied = self.occupied_positions();
            if let Some(spawn) = self.allocator.find_available(&self.board, &occupied) {
                if let Some(player) = self.players.get_mut(&id) {
                    player.x = spawn.x;
                    player.y = spawn.y;
                }
            } else {
                tracing::warn!(player_id = %id, "no spawn available during restart, leaving in place");
            }
        }
        self.score = 0;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            board: Arc::clone(&self.board),
            players: self.players.values().cloned().collect(),
            entities: self.entities.values().cloned().collect(),
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board::CellKind;

    fn test_board() -> Arc<Board> {
        let cells = vec![CellKind::Empty; 400]; // 20x20
        Arc::new(Board::from_cells(20, 20, cells, vec![Coord::new(1, 1), Coord::new(18, 18)]).unwrap())
    }

    fn core() -> GameCore {
        GameCore::new(test_board(), SpawnAllocator::new(3), vec![])
    }

    #[test]
    fn accepted_move_updates_position_exactly_by_delta() {
        let mut game = core();
        let id = PlayerId(1);
        game.place_player(id, "Alice".into(), Coord::new(5, 5));
        let new_pos = game.apply_move(id, 1, -1).unwrap();
        assert_eq!(new_pos, Coord::new(6, 4));
    }

    #[test]
    fn rejected_move_leaves_position_untouched() {
        let mut game = core();
        let id = PlayerId(1);
        game.place_player(id, "Alice".into(), Coord::new(0, 0));
        let err = game.apply_move(id, -1, 0).unwrap_err();
        assert!(matches!(err, ApplyMoveError::Rejected(MoveFailReason::OutOfBounds)));
        assert_eq!(game.player(id).unwrap().position(), Coord::new(0, 0));
    }

    #[test]
    fn wall_blocks_move() {
        let mut cells = vec![CellKind::Empty; 400];
        cells[(5 * 20 + 6) as usize] = CellKind::Wall;
        let board = Arc::new(Board::from_cells(20, 20, cells, vec![]).unwrap());
        let mut game = GameCore::new(board, SpawnAllocator::new(3), vec![]);
        let id = PlayerId(1);
        game.place_player(id, "A".into(), Coord::new(5, 5));
        assert!(matches!(game.apply_move(id, 1, 0).unwrap_err(), ApplyMoveError::Rejected(MoveFailReason::Wall)));
    }

    #[test]
    fn collision_rejects_move_onto_another_player() {
        let mut game = core();
        let a = PlayerId(1);
        let b = PlayerId(2);
        game.place_player(a, "A".into(), Coord::new(5, 5));
        game.place_player(b, "B".into(), Coord::new(6, 5));
        assert!(matches!(game.apply_move(a, 1, 0).unwrap_err(), ApplyMoveError::Rejected(MoveFailReason::PlayerCollision)));
    }

    #[test]
    fn restart_resets_score_and_repositions_players() {
        let mut game = core();
        let id = PlayerId(1);
        game.place_player(id, "A".into(), Coord::new(1, 1));
        game.apply_move(id, 1, 0).unwrap();
        game.restart();
        assert_eq!(game.snapshot().score, 0);
        let pos = game.player(id).unwrap().position();
        assert!(pos == Coord::new(1, 1) || pos == Coord::new(18, 18));
    }

    #[test]
    fn stepping_onto_a_collectible_entity_raises_score_and_despawns_it() {
        let mut game = GameCore::new(
            test_board(),
            SpawnAllocator::new(3),
            vec![EntitySpawn {
                x: 6,
                y: 5,
                entity_type: "coin".into(),
                glyph: '$',
                color: None,
                solid: false,
                score_value: Some(5),
            }],
        );
        let id = PlayerId(1);
        game.place_player(id, "A".into(), Coord::new(5, 5));
        game.apply_move(id, 1, 0).unwrap();
        let snapshot = game.snapshot();
        assert_eq!(snapshot.score, 5);
        assert!(snapshot.entities.is_empty());
    }

    #[test]
    fn solid_entity_blocks_like_a_wall() {
        let mut game = GameCore::new(
            test_board(),
            SpawnAllocator::new(3),
            vec![EntitySpawn {
                x: 6,
                y: 5,
                entity_type: "rock".into(),
                glyph: '#',
                color: None,
                solid: true,
                score_value: None,
            }],
        );
        let id = PlayerId(1);
        game.place_player(id, "A".into(), Coord::new(5, 5));
        assert!(matches!(game.apply_move(id, 1, 0).unwrap_err(), ApplyMoveError::Rejected(MoveFailReason::Wall)));
    }

    #[test]
    fn move_by_an_unknown_player_reports_unknown_player_not_a_move_rejection() {
        let mut game = core();
        let err = game.apply_move(PlayerId(99), 1, 0).unwrap_err();
        assert!(matches!(err, ApplyMoveError::Unknown(GameCoreError::UnknownPlayer(PlayerId(99)))));
    }
}
