//! Dice: a roll from 0.00 to 100.00 against an over/under target.

use super::mapper::{wrong_game, OutcomeMapper};
use super::types::{
    DiceDirection, DiceOutcome, GameOutcome, GameParameters, GameType, Hundredths, MappedOutcome,
    OutcomeRules,
};
use crate::byte_stream::ByteStream;
use crate::config::DiceConfig;
use crate::errors::{EngineError, EngineResult};

/// Rolls land on 0..=10000 hundredths
pub const ROLL_RANGE: u64 = 10_001;

pub struct DiceMapper {
    config: DiceConfig,
}

impl DiceMapper {
    pub fn new(config: DiceConfig) -> Self {
        Self { config }
    }

    /// Roll value from the next 4 bytes
    pub fn roll(stream: &mut ByteStream) -> Hundredths {
        Hundredths(stream.next_u32() as u64 % ROLL_RANGE)
    }

    /// Count of roll values that win for this bet
    pub fn winning_values(target: Hundredths, direction: DiceDirection) -> u64 {
        match direction {
            DiceDirection::Over => (ROLL_RANGE - 1).saturating_sub(target.get()),
            DiceDirection::Under => target.get().min(ROLL_RANGE),
        }
    }
}

impl OutcomeMapper for DiceMapper {
    fn game_type(&self) -> GameType {
        GameType::Dice
    }

    fn rules(&self) -> OutcomeRules {
        OutcomeRules::Dice
    }

    fn validate(&self, params: &GameParameters) -> EngineResult<()> {
        let GameParameters::Dice(dice) = params else {
            return Err(wrong_game(GameType::Dice, params));
        };

        if dice.target < self.config.min_target || dice.target > self.config.max_target {
            return Err(EngineError::invalid_parameters(format!(
                "dice target {} outside {}..={}",
                dice.target, self.config.min_target, self.config.max_target
            )));
        }

        // winning / 10001 <= cap_bps / 10000, kept in integers
        let winning = Self::winning_values(dice.target, dice.direction);
        if winning * 10_000 > self.config.max_win_chance_bps as u64 * ROLL_RANGE {
            return Err(EngineError::invalid_parameters(format!(
                "dice {} {} exceeds the {} bps win-chance cap",
                dice.direction, dice.target, self.config.max_win_chance_bps
            )));
        }
        Ok(())
    }

    fn map(&self, stream: &mut ByteStream, params: &GameParameters) -> EngineResult<MappedOutcome> {
        let GameParameters::Dice(dice) = params else {
            return Err(wrong_game(GameType::Dice, params));
        };

        let start = stream.bytes_consumed();
        let roll = Self::roll(stream);
        let won = match dice.direction {
            DiceDirection::Over => roll > dice.target,
            DiceDirection::Under => roll < dice.target,
        };

        Ok(MappedOutcome {
            outcome: GameOutcome::Dice(DiceOutcome { roll, won }),
            bytes_consumed: stream.bytes_consumed() - start,
        })
    }

    fn formula(&self) -> String {
        "dice: v = next 4 bytes as big-endian u32; roll = (v mod 10001) / 100 (0.00..=100.00); \
won = (direction = over and roll > target) or (direction = under and roll < target)"
            .to_string()
    }
}
