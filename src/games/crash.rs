//! Crash: one 32-bit draw becomes a multiplier with a 1% house edge.

use super::mapper::{wrong_game, OutcomeMapper};
use super::types::{
    CrashOutcome, CrashRules, GameOutcome, GameParameters, GameType, Hundredths, MappedOutcome,
    OutcomeRules,
};
use crate::byte_stream::ByteStream;
use crate::config::CrashConfig;
use crate::errors::{EngineError, EngineResult};

const TWO_POW_32: u128 = 1 << 32;

pub struct CrashMapper {
    config: CrashConfig,
}

impl CrashMapper {
    pub fn new(config: CrashConfig) -> Self {
        Self { config }
    }

    /// Mapper for rules recorded on a round
    pub fn from_rules(rules: CrashRules) -> Self {
        Self::new(CrashConfig {
            min_multiplier: rules.min_multiplier,
            max_multiplier: rules.max_multiplier,
            instant_crash_modulus: rules.instant_crash_modulus,
        })
    }

    /// Crash point from a 32-bit draw, before instant-crash and clamping.
    ///
    /// `floor(99 / (1 - h / 2^32))` hundredths, computed exactly as
    /// `floor(99 * 2^32 / (2^32 - h))`.
    pub fn raw_crash_point(h: u32) -> Hundredths {
        let numerator = 99 * TWO_POW_32;
        let denominator = TWO_POW_32 - h as u128;
        Hundredths((numerator / denominator) as u64)
    }

    pub fn crash_point(&self, h: u32) -> (Hundredths, bool) {
        let modulus = self.config.instant_crash_modulus;
        if modulus > 0 && h % modulus == 0 {
            return (self.config.min_multiplier, true);
        }
        let raw = Self::raw_crash_point(h);
        (
            raw.clamp(self.config.min_multiplier, self.config.max_multiplier),
            false,
        )
    }
}

impl OutcomeMapper for CrashMapper {
    fn game_type(&self) -> GameType {
        GameType::Crash
    }

    fn rules(&self) -> OutcomeRules {
        OutcomeRules::Crash(CrashRules {
            min_multiplier: self.config.min_multiplier,
            max_multiplier: self.config.max_multiplier,
            instant_crash_modulus: self.config.instant_crash_modulus,
        })
    }

    fn validate(&self, params: &GameParameters) -> EngineResult<()> {
        let GameParameters::Crash(crash) = params else {
            return Err(wrong_game(GameType::Crash, params));
        };
        if let Some(cashout) = crash.auto_cashout {
            if cashout <= self.config.min_multiplier || cashout > self.config.max_multiplier {
                return Err(EngineError::invalid_parameters(format!(
                    "auto cashout {} must be above {} and at most {}",
                    cashout, self.config.min_multiplier, self.config.max_multiplier
                )));
            }
        }
        Ok(())
    }

    fn map(&self, stream: &mut ByteStream, params: &GameParameters) -> EngineResult<MappedOutcome> {
        let GameParameters::Crash(crash) = params else {
            return Err(wrong_game(GameType::Crash, params));
        };

        let start = stream.bytes_consumed();
        let h = stream.next_u32();
        let (crash_point, instant_crash) = self.crash_point(h);
        let cashed_out = crash.auto_cashout.map(|target| crash_point >= target);

        Ok(MappedOutcome {
            outcome: GameOutcome::Crash(CrashOutcome {
                crash_point,
                instant_crash,
                cashed_out,
            }),
            bytes_consumed: stream.bytes_consumed() - start,
        })
    }

    fn formula(&self) -> String {
        let instant = if self.config.instant_crash_modulus > 0 {
            format!(
                "if h mod {} = 0 the round crashes instantly at {}x; otherwise ",
                self.config.instant_crash_modulus, self.config.min_multiplier
            )
        } else {
            String::new()
        };
        format!(
            "crash: h = next 4 bytes as big-endian u32; {}crashPoint = floor(99 * 2^32 / (2^32 - h)) / 100, \
clamped to [{}x, {}x]; cashedOut = crashPoint >= autoCashout when an auto cashout is set",
            instant, self.config.min_multiplier, self.config.max_multiplier
        )
    }
}
