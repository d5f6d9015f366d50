//! The narrow board-loader interface the core consumes (spec §1: "board
//! loader produces an immutable board + spawn list"). Full map-file
//! parsing is explicitly out of scope; this is the minimal JSON adapter
//! that satisfies that interface for a standalone binary.

use board::{Board, BoardError, Coord, SourceCell};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct BoardFile {
    width: u32,
    height: u32,
    /// One string per row; `#` = wall, `S` = spawn, anything else = empty.
    rows: Vec<String>,
    #[serde(default)]
    spawns: Option<Vec<[u32; 2]>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BoardLoadError {
    #[error("failed to read board file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse board file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("row {0} has {1} columns, expected {2}")]
    RowWidthMismatch(usize, usize, u32),
    #[error("board file declares {0} rows, expected {1}")]
    RowCountMismatch(usize, u32),
    #[error(transparent)]
    Board(#[from] BoardError),
}

pub async fn load_board_file(path: &Path, max_spawns: usize) -> Result<Board, BoardLoadError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BoardLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let file: BoardFile = serde_json::from_str(&text).map_err(|source| BoardLoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    if file.rows.len() as u32 != file.height {
        return Err(BoardLoadError::RowCountMismatch(file.rows.len(), file.height));
    }

    let mut cells = Vec::with_capacity((file.width * file.height) as usize);
    for (y, row) in file.rows.iter().enumerate() {
        let chars: Vec<char> = row.chars().collect();
        if chars.len() as u32 != file.width {
            return Err(BoardLoadError::RowWidthMismatch(y, chars.len(), file.width));
        }
        for ch in chars {
            cells.push(match ch {
                '#' => SourceCell::Wall,
                'S' => SourceCell::Spawn,
                _ => SourceCell::Empty,
            });
        }
    }

    let explicit_spawns = file
        .spawns
        .map(|list| list.into_iter().map(|[x, y]| Coord::new(x, y)).collect());

    Board::from_source(file.width, file.height, cells, explicit_spawns, max_spawns)
        .map_err(BoardLoadError::from)
}

/// A bare, wall-free board used when no board file is supplied — useful
/// for quick local testing.
pub fn empty_board(width: u32, height: u32) -> Board {
    let cells = vec![SourceCell::Empty; (width * height) as usize];
    Board::from_source(width, height, cells, Some(Vec::new()), board::DEFAULT_MAX_SPAWN_POINTS)
        .expect("an all-empty board with no spawns is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_board_has_no_spawns_and_no_walls() {
        let b = empty_board(5, 5);
        assert!(b.spawns().is_empty());
        assert!(!b.is_wall(Coord::new(2, 2)));
    }
}
