//! Mines: partial Fisher-Yates shuffle of a 5x5 board.

use super::mapper::{wrong_game, OutcomeMapper};
use super::types::{GameOutcome, GameParameters, GameType, MappedOutcome, MinesOutcome, OutcomeRules};
use crate::byte_stream::ByteStream;
use crate::config::MinesConfig;
use crate::errors::{EngineError, EngineResult};

/// Cells on the 5x5 board
pub const BOARD_CELLS: u8 = 25;

pub struct MinesMapper {
    config: MinesConfig,
}

impl MinesMapper {
    pub fn new(config: MinesConfig) -> Self {
        Self { config }
    }

    /// Partial Fisher-Yates: the first `count` cells after shuffling are mines.
    pub fn place_mines(stream: &mut ByteStream, count: u8) -> Vec<u8> {
        let mut cells: Vec<u8> = (0..BOARD_CELLS).collect();
        for i in 0..count as usize {
            let remaining = BOARD_CELLS as u32 - i as u32;
            let j = i + stream.uniform_below(remaining) as usize;
            cells.swap(i, j);
        }
        let mut mines = cells[..count as usize].to_vec();
        mines.sort_unstable();
        mines
    }
}

impl OutcomeMapper for MinesMapper {
    fn game_type(&self) -> GameType {
        GameType::Mines
    }

    fn rules(&self) -> OutcomeRules {
        OutcomeRules::Mines
    }

    fn validate(&self, params: &GameParameters) -> EngineResult<()> {
        let GameParameters::Mines(mines) = params else {
            return Err(wrong_game(GameType::Mines, params));
        };
        if mines.mines_count < self.config.min_mines || mines.mines_count > self.config.max_mines {
            return Err(EngineError::invalid_parameters(format!(
                "mines count {} outside {}..={}",
                mines.mines_count, self.config.min_mines, self.config.max_mines
            )));
        }
        Ok(())
    }

    fn map(&self, stream: &mut ByteStream, params: &GameParameters) -> EngineResult<MappedOutcome> {
        let GameParameters::Mines(mines) = params else {
            return Err(wrong_game(GameType::Mines, params));
        };
        if mines.mines_count >= BOARD_CELLS {
            return Err(EngineError::invalid_parameters(format!(
                "mines count {} leaves no safe cell",
                mines.mines_count
            )));
        }

        let start = stream.bytes_consumed();
        let mine_positions = Self::place_mines(stream, mines.mines_count);

        Ok(MappedOutcome {
            outcome: GameOutcome::Mines(MinesOutcome { mine_positions }),
            bytes_consumed: stream.bytes_consumed() - start,
        })
    }

    fn formula(&self) -> String {
        "mines: cells = [0..24] (row-major 5x5); for i in 0..minesCount: \
draw v = next 4 bytes as big-endian u32, rejecting and redrawing while v >= floor(2^32 / (25 - i)) * (25 - i); \
j = i + (v mod (25 - i)); swap cells[i], cells[j]; mines = sorted(cells[0..minesCount])"
            .to_string()
    }
}
