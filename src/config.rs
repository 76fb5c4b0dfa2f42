//! Configuration management with validation and defaults
//!
//! Settings load from an optional TOML file, then `FAIRNESS_*` environment
//! variables override individual fields, then the result is validated.

use crate::errors::{ConfigurationError, EngineResult};
use crate::games::types::Hundredths;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Complete engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub seeds: SeedConfig,
    pub dice: DiceConfig,
    pub crash: CrashConfig,
    pub mines: MinesConfig,
    pub api: ApiConfig,
}

/// When server seeds are disclosed
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisclosurePolicy {
    /// One seed covers a window of rounds; revealed when rotated out.
    PerSeed,
    /// Each round gets its own seed, revealed at settlement.
    PerRound,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub disclosure: DisclosurePolicy,
    /// Rounds a seed may serve before it is retired (per-seed policy)
    pub rounds_per_seed: u64,
    /// Published client seed bound when the player supplies none
    pub default_client_seed: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            disclosure: DisclosurePolicy::PerSeed,
            rounds_per_seed: 10_000,
            default_client_seed: "fairness-engine:default-client-seed:v1".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    pub min_target: Hundredths,
    pub max_target: Hundredths,
    /// House-edge cap on win probability, in basis points
    pub max_win_chance_bps: u32,
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            min_target: Hundredths(101),
            max_target: Hundredths(9_900),
            max_win_chance_bps: 9_900,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub min_multiplier: Hundredths,
    pub max_multiplier: Hundredths,
    /// `h mod n == 0` crashes instantly; 0 disables
    pub instant_crash_modulus: u32,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            min_multiplier: Hundredths(100),
            max_multiplier: Hundredths(100_000_000), // 1,000,000.00x
            instant_crash_modulus: 33,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MinesConfig {
    pub min_mines: u8,
    pub max_mines: u8,
}

impl Default for MinesConfig {
    fn default() -> Self {
        Self {
            min_mines: 1,
            max_mines: 24,
        }
    }
}

/// HTTP adapter settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            log_filter: "fairness_engine=info,fairness_api=info,tower_http=info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => EngineConfig::default(),
        };

        Self::apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &str) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        Ok(toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))?)
    }

    /// Apply `FAIRNESS_*` overrides read through `lookup`
    fn apply_overrides<F>(config: &mut EngineConfig, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FAIRNESS_DISCLOSURE") {
            config.seeds.disclosure = match value.as_str() {
                "per_seed" => DisclosurePolicy::PerSeed,
                "per_round" => DisclosurePolicy::PerRound,
                _ => return Err(invalid("FAIRNESS_DISCLOSURE", &value, "expected per_seed or per_round")),
            };
        }
        if let Some(value) = lookup("FAIRNESS_ROUNDS_PER_SEED") {
            config.seeds.rounds_per_seed = value
                .parse()
                .map_err(|_| invalid("FAIRNESS_ROUNDS_PER_SEED", &value, "Invalid round count"))?;
        }
        if let Some(value) = lookup("FAIRNESS_DEFAULT_CLIENT_SEED") {
            config.seeds.default_client_seed = value;
        }
        if let Some(value) = lookup("FAIRNESS_API_HOST") {
            config.api.host = value;
        }
        if let Some(value) = lookup("FAIRNESS_API_PORT") {
            config.api.port = value
                .parse()
                .map_err(|_| invalid("FAIRNESS_API_PORT", &value, "Invalid port number"))?;
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::EngineError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl EngineConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> EngineResult<()> {
        if self.seeds.disclosure == DisclosurePolicy::PerSeed && self.seeds.rounds_per_seed == 0 {
            return Err(invalid("seeds.rounds_per_seed", "0", "must be positive for per_seed disclosure"));
        }
        crate::seed_vault::validate_client_seed(&self.seeds.default_client_seed).map_err(|_| {
            invalid(
                "seeds.default_client_seed",
                &self.seeds.default_client_seed,
                "must be 1-64 printable ASCII characters",
            )
        })?;

        if self.dice.min_target.get() == 0
            || self.dice.min_target > self.dice.max_target
            || self.dice.max_target.get() >= 10_000
        {
            return Err(invalid(
                "dice",
                &format!("{}..={}", self.dice.min_target, self.dice.max_target),
                "targets must satisfy 0.00 < min <= max < 100.00",
            ));
        }
        if self.dice.max_win_chance_bps == 0 || self.dice.max_win_chance_bps > 10_000 {
            return Err(invalid(
                "dice.max_win_chance_bps",
                &self.dice.max_win_chance_bps.to_string(),
                "must be within 1..=10000",
            ));
        }

        if self.crash.min_multiplier < Hundredths(100) || self.crash.min_multiplier > self.crash.max_multiplier {
            return Err(invalid(
                "crash",
                &format!("{}..={}", self.crash.min_multiplier, self.crash.max_multiplier),
                "multipliers must satisfy 1.00 <= min <= max",
            ));
        }

        if self.mines.min_mines == 0
            || self.mines.min_mines > self.mines.max_mines
            || self.mines.max_mines >= crate::games::mines::BOARD_CELLS
        {
            return Err(invalid(
                "mines",
                &format!("{}..={}", self.mines.min_mines, self.mines.max_mines),
                "mine counts must satisfy 1 <= min <= max <= 24",
            ));
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", "0", "Port cannot be zero"));
        }
        Ok(())
    }
}
