//! Coin flip: parity of a single byte.

use super::mapper::{wrong_game, OutcomeMapper};
use super::types::{
    CoinChoice, CoinFlipOutcome, GameOutcome, GameParameters, GameType, MappedOutcome, OutcomeRules,
};
use crate::byte_stream::ByteStream;
use crate::errors::EngineResult;

/// Coin flip: one byte, even is heads
pub struct CoinFlipMapper;

impl CoinFlipMapper {
    pub fn flip(stream: &mut ByteStream) -> CoinChoice {
        let byte = stream.next(1)[0];
        if byte % 2 == 0 {
            CoinChoice::Heads
        } else {
            CoinChoice::Tails
        }
    }
}

impl OutcomeMapper for CoinFlipMapper {
    fn game_type(&self) -> GameType {
        GameType::CoinFlip
    }

    fn rules(&self) -> OutcomeRules {
        OutcomeRules::CoinFlip
    }

    fn validate(&self, params: &GameParameters) -> EngineResult<()> {
        match params {
            GameParameters::CoinFlip(_) => Ok(()),
            other => Err(wrong_game(GameType::CoinFlip, other)),
        }
    }

    fn map(&self, stream: &mut ByteStream, params: &GameParameters) -> EngineResult<MappedOutcome> {
        let GameParameters::CoinFlip(flip) = params else {
            return Err(wrong_game(GameType::CoinFlip, params));
        };

        let start = stream.bytes_consumed();
        let result = Self::flip(stream);
        Ok(MappedOutcome {
            outcome: GameOutcome::CoinFlip(CoinFlipOutcome {
                result,
                won: result == flip.choice,
            }),
            bytes_consumed: stream.bytes_consumed() - start,
        })
    }

    fn formula(&self) -> String {
        "coinflip: b = next byte; result = heads if b is even, tails if odd; won = result = choice".to_string()
    }
}
