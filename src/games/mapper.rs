//! Outcome mapper trait and registry.
//!
//! A mapper is a pure function from a byte stream and fixed game parameters
//! to an outcome. Adding a game means adding a [`GameType`] variant, its
//! parameter/outcome types and an [`OutcomeMapper`] registered here.

use super::{
    coinflip::CoinFlipMapper, crash::CrashMapper, dice::DiceMapper, mines::MinesMapper,
    types::{GameParameters, GameType, MappedOutcome, OutcomeRules},
};
use crate::byte_stream::ByteStream;
use crate::config::{DiceConfig, EngineConfig, MinesConfig};
use crate::errors::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::Arc;

pub trait OutcomeMapper: Send + Sync {
    fn game_type(&self) -> GameType;

    /// Settings that shape outcomes, recorded on every round this mapper opens.
    fn rules(&self) -> OutcomeRules;

    /// Reject parameters at round creation; never called at outcome time.
    fn validate(&self, params: &GameParameters) -> EngineResult<()>;

    /// Consume bytes from `stream` and produce the outcome.
    fn map(&self, stream: &mut ByteStream, params: &GameParameters) -> EngineResult<MappedOutcome>;

    /// Published formula, precise enough to reproduce outcomes by hand.
    fn formula(&self) -> String;
}

/// Error for a mapper handed another game's parameters
pub(crate) fn wrong_game(expected: GameType, params: &GameParameters) -> EngineError {
    EngineError::invalid_parameters(format!(
        "{} mapper received {} parameters",
        expected,
        params.game_type()
    ))
}

/// Mapper that reproduces outcomes under recorded `rules`.
///
/// Dice and mines limits only gate round creation, so their defaults stand in.
pub fn mapper_for_rules(rules: &OutcomeRules) -> Arc<dyn OutcomeMapper> {
    match rules {
        OutcomeRules::Crash(crash) => Arc::new(CrashMapper::from_rules(*crash)),
        OutcomeRules::Dice => Arc::new(DiceMapper::new(DiceConfig::default())),
        OutcomeRules::Mines => Arc::new(MinesMapper::new(MinesConfig::default())),
        OutcomeRules::CoinFlip => Arc::new(CoinFlipMapper),
    }
}

/// Lookup from game type to mapper
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: HashMap<GameType, Arc<dyn OutcomeMapper>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in game, configured from `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CrashMapper::new(config.crash.clone())));
        registry.register(Arc::new(DiceMapper::new(config.dice.clone())));
        registry.register(Arc::new(MinesMapper::new(config.mines.clone())));
        registry.register(Arc::new(CoinFlipMapper));
        registry
    }

    /// Add or replace the mapper for its game type
    pub fn register(&mut self, mapper: Arc<dyn OutcomeMapper>) {
        self.mappers.insert(mapper.game_type(), mapper);
    }

    pub fn get(&self, game_type: GameType) -> EngineResult<&Arc<dyn OutcomeMapper>> {
        self.mappers.get(&game_type).ok_or_else(|| {
            EngineError::invalid_parameters(format!("no outcome mapper for {}", game_type))
        })
    }

    /// Validate parameters against the declared game type and its mapper
    pub fn validate(&self, game_type: GameType, params: &GameParameters) -> EngineResult<()> {
        if params.game_type() != game_type {
            return Err(EngineError::invalid_parameters(format!(
                "{} round given {} parameters",
                game_type,
                params.game_type()
            )));
        }
        self.get(game_type)?.validate(params)
    }

    pub fn map(&self, stream: &mut ByteStream, params: &GameParameters) -> EngineResult<MappedOutcome> {
        self.get(params.game_type())?.map(stream, params)
    }

    pub fn game_types(&self) -> Vec<GameType> {
        self.mappers.keys().copied().collect()
    }
}
