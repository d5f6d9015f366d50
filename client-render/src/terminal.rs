//! The concrete out-of-scope terminal surface: cursor control and styled
//! output via `crossterm`. Kept deliberately thin — the driver in `lib.rs`
//! carries all of the interesting diffing logic.

use crate::{Surface, SurfaceError};
use crossterm::cursor::MoveTo;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{ExecutableCommand, QueueableCommand};
use protocol::GameStateDto;
use std::io::{self, Write};

/// Board-width cutoff between two-line and one-line status (spec's
/// `statusBar.threshold`).
pub const DEFAULT_STATUS_BAR_THRESHOLD: u32 = 25;

pub struct CrosstermSurface<W: Write> {
    out: W,
    status_row: u16,
    status_bar_threshold: u32,
}

impl<W: Write> CrosstermSurface<W> {
    pub fn new(out: W, status_row: u16) -> Self {
        CrosstermSurface {
            out,
            status_row,
            status_bar_threshold: DEFAULT_STATUS_BAR_THRESHOLD,
        }
    }

    pub fn with_status_bar_threshold(mut self, threshold: u32) -> Self {
        self.status_bar_threshold = threshold;
        self
    }

    fn io_err(error: io::Error) -> SurfaceError {
        SurfaceError(error.to_string())
    }

    fn board_glyph(wall: bool) -> char {
        if wall { '#' } else { '.' }
    }
}

impl<W: Write> Surface for CrosstermSurface<W> {
    fn render_full(&mut self, snapshot: &GameStateDto) -> Result<(), SurfaceError> {
        self.out.execute(Clear(ClearType::All)).map_err(Self::io_err)?;

        for y in 0..snapshot.board.height {
            for x in 0..snapshot.board.width {
                let index = (y * snapshot.board.width + x) as usize;
                let wall = snapshot.board.grid.get(index).copied().unwrap_or(false);
                self.out
                    .queue(MoveTo(x as u16, y as u16))
                    .map_err(Self::io_err)?
                    .queue(Print(Self::board_glyph(wall)))
                    .map_err(Self::io_err)?;
            }
        }

        for entity in &snapshot.entities {
            self.paint_cell(
                entity.x,
                entity.y,
                entity.glyph.chars().next().unwrap_or('?'),
                entity.color.as_deref(),
            )?;
        }
        for player in &snapshot.players {
            let glyph = player.player_name.chars().next().unwrap_or('@').to_ascii_uppercase();
            self.paint_cell(player.x, player.y, glyph, None)?;
        }

        self.update_status(snapshot.score, snapshot.board.width)?;
        self.out.flush().map_err(Self::io_err)
    }

    fn paint_cell(&mut self, x: u32, y: u32, glyph: char, color: Option<&str>) -> Result<(), SurfaceError> {
        self.out.queue(MoveTo(x as u16, y as u16)).map_err(Self::io_err)?;
        if let Some(name) = color {
            self.out
                .queue(SetForegroundColor(named_color(name)))
                .map_err(Self::io_err)?;
        }
        self.out.queue(Print(glyph)).map_err(Self::io_err)?;
        if color.is_some() {
            self.out.queue(ResetColor).map_err(Self::io_err)?;
        }
        self.out.flush().map_err(Self::io_err)
    }

    fn update_status(&mut self, score: i64, board_width: u32) -> Result<(), SurfaceError> {
        self.out
            .queue(MoveTo(0, self.status_row))
            .map_err(Self::io_err)?
            .queue(Clear(ClearType::CurrentLine))
            .map_err(Self::io_err)?;
        if board_width >= self.status_bar_threshold {
            self.out.queue(Print(format!("score: {score}"))).map_err(Self::io_err)?;
        } else {
            // Not enough width for the label and value on one line.
            self.out.queue(Print("score:")).map_err(Self::io_err)?;
            self.out
                .queue(MoveTo(0, self.status_row + 1))
                .map_err(Self::io_err)?
                .queue(Clear(ClearType::CurrentLine))
                .map_err(Self::io_err)?
                .queue(Print(format!("{score}")))
                .map_err(Self::io_err)?;
        }
        self.out.flush().map_err(Self::io_err)
    }
}

fn named_color(name: &str) -> Color {
    match name {
        "red" => Color::Red,
        "green" => Color::Green,
        "blue" => Color::Blue,
        "yellow" => Color::Yellow,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        _ => Color::White,
    }
}
