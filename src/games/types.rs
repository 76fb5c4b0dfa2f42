//! Game identifiers, parameters, outcomes and the fixed-point `Hundredths` type.

use crate::errors::{EngineError, EngineResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    Dice,
    Mines,
    CoinFlip,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Crash => write!(f, "crash"),
            GameType::Dice => write!(f, "dice"),
            GameType::Mines => write!(f, "mines"),
            GameType::CoinFlip => write!(f, "coinflip"),
        }
    }
}

impl FromStr for GameType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crash" => Ok(GameType::Crash),
            "dice" => Ok(GameType::Dice),
            "mines" => Ok(GameType::Mines),
            "coinflip" => Ok(GameType::CoinFlip),
            other => Err(EngineError::invalid_parameters(format!(
                "unknown game type '{}'",
                other
            ))),
        }
    }
}

/// Fixed-point value with two decimals, stored as an integer count of hundredths.
///
/// Dice targets and rolls and crash multipliers use this so that outcome
/// mapping never touches floating point. On the wire it is a JSON number
/// (`32.06`); decimal strings (`"32.06"`) are accepted when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hundredths(pub u64);

impl Hundredths {
    pub const fn new(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    fn from_f64(value: f64) -> Result<Self, String> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{} is not a non-negative number", value));
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(format!("{} has more than two decimal places", value));
        }
        Ok(Self(rounded as u64))
    }
}

impl fmt::Display for Hundredths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Hundredths {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(format!("'{}' is not a decimal with at most two places", s));
        }
        let whole: u64 = whole
            .parse()
            .map_err(|_| format!("'{}' is not a decimal number", s))?;
        let frac_value: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| format!("'{}' is not a decimal number", s))? * 10,
            _ => frac.parse().map_err(|_| format!("'{}' is not a decimal number", s))?,
        };
        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac_value))
            .map(Hundredths)
            .ok_or_else(|| format!("'{}' is out of range", s))
    }
}

impl Serialize for Hundredths {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Hundredths {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Hundredths::from_f64(n).map_err(de::Error::custom),
            Raw::Text(t) => t.parse().map_err(de::Error::custom),
        }
    }
}

/// Dice bet direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiceDirection {
    Over,
    Under,
}

impl fmt::Display for DiceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceDirection::Over => write!(f, "over"),
            DiceDirection::Under => write!(f, "under"),
        }
    }
}

/// Coin flip choice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoinChoice {
    Heads,
    Tails,
}

impl fmt::Display for CoinChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinChoice::Heads => write!(f, "heads"),
            CoinChoice::Tails => write!(f, "tails"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiceParams {
    pub target: Hundredths,
    pub direction: DiceDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CrashParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_cashout: Option<Hundredths>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MinesParams {
    pub mines_count: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoinFlipParams {
    pub choice: CoinChoice,
}

/// Game-specific inputs fixed at round start (discriminated union)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameParameters {
    Crash(CrashParams),
    Dice(DiceParams),
    Mines(MinesParams),
    CoinFlip(CoinFlipParams),
}

impl GameParameters {
    pub fn game_type(&self) -> GameType {
        match self {
            GameParameters::Crash(_) => GameType::Crash,
            GameParameters::Dice(_) => GameType::Dice,
            GameParameters::Mines(_) => GameType::Mines,
            GameParameters::CoinFlip(_) => GameType::CoinFlip,
        }
    }

    /// Parse untagged parameters for a known game type, as sent by API callers.
    pub fn from_json(game_type: GameType, value: serde_json::Value) -> EngineResult<Self> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        let invalid = |e: serde_json::Error| {
            EngineError::invalid_parameters(format!("{} parameters: {}", game_type, e))
        };
        Ok(match game_type {
            GameType::Crash => GameParameters::Crash(serde_json::from_value(value).map_err(invalid)?),
            GameType::Dice => GameParameters::Dice(serde_json::from_value(value).map_err(invalid)?),
            GameType::Mines => GameParameters::Mines(serde_json::from_value(value).map_err(invalid)?),
            GameType::CoinFlip => {
                GameParameters::CoinFlip(serde_json::from_value(value).map_err(invalid)?)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiceOutcome {
    pub roll: Hundredths,
    pub won: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrashOutcome {
    pub crash_point: Hundredths,
    pub instant_crash: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cashed_out: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MinesOutcome {
    /// Mine cells on the 5x5 board, ascending, row-major from 0
    pub mine_positions: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CoinFlipOutcome {
    pub result: CoinChoice,
    pub won: bool,
}

/// Game-specific result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Crash(CrashOutcome),
    Dice(DiceOutcome),
    Mines(MinesOutcome),
    CoinFlip(CoinFlipOutcome),
}

impl GameOutcome {
    pub fn game_type(&self) -> GameType {
        match self {
            GameOutcome::Crash(_) => GameType::Crash,
            GameOutcome::Dice(_) => GameType::Dice,
            GameOutcome::Mines(_) => GameType::Mines,
            GameOutcome::CoinFlip(_) => GameType::CoinFlip,
        }
    }
}

/// Mapper output: the outcome plus how much of the stream produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedOutcome {
    pub outcome: GameOutcome,
    pub bytes_consumed: usize,
}

/// Crash settings that move the crash point
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrashRules {
    pub min_multiplier: Hundredths,
    pub max_multiplier: Hundredths,
    pub instant_crash_modulus: u32,
}

/// Mapper settings in force when a round opened.
///
/// Stored on the round, so settlement and verification reproduce the
/// outcome under the rules published with the commitment even after the
/// live configuration changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum OutcomeRules {
    Crash(CrashRules),
    Dice,
    Mines,
    CoinFlip,
}

impl OutcomeRules {
    pub fn game_type(&self) -> GameType {
        match self {
            OutcomeRules::Crash(_) => GameType::Crash,
            OutcomeRules::Dice => GameType::Dice,
            OutcomeRules::Mines => GameType::Mines,
            OutcomeRules::CoinFlip => GameType::CoinFlip,
        }
    }
}
