//! Maps `game-core`'s internal snapshot into the wire-level DTOs defined
//! by `protocol`. Kept in `server` so neither library crate needs to know
//! about the other's types.

use crate::ids::player_id_to_wire;
use game_core::Snapshot;
use protocol::{BoardDto, EntityDto, GameStateDto, PlayerDto};

pub fn snapshot_to_dto(snapshot: &Snapshot) -> GameStateDto {
    GameStateDto {
        board: BoardDto {
            width: snapshot.board.width(),
            height: snapshot.board.height(),
            grid: snapshot.board.wall_grid(),
        },
        players: snapshot
            .players
            .iter()
            .map(|p| PlayerDto {
                player_id: player_id_to_wire(p.id),
                x: p.x,
                y: p.y,
                player_name: p.name.clone(),
            })
            .collect(),
        entities: snapshot
            .entities
            .iter()
            .map(|e| EntityDto {
                entity_id: e.id.to_string(),
                x: e.x,
                y: e.y,
                entity_type: e.entity_type.clone(),
                glyph: e.glyph.to_string(),
                color: e.color.clone(),
                animation_frame: e.animation_frame,
            })
            .collect(),
        score: snapshot.score,
    }
}
