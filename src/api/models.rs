//! API request and response models

use crate::games::{GameOutcome, GameType};
use crate::ledger::{Round, RoundStatus};
use crate::seed_vault::SeedId;
use serde::{Deserialize, Serialize};

/// POST /rounds body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoundRequest {
    pub game_type: GameType,
    #[serde(default)]
    pub game_parameters: serde_json::Value,
    pub client_seed: Option<String>,
}

/// Pre-commitment proof returned when a round opens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoundResponse {
    pub round_number: u64,
    pub seed_id: SeedId,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub game_type: GameType,
    /// Outcome formula fixed for this round
    pub formula: String,
}

impl From<&Round> for OpenRoundResponse {
    fn from(round: &Round) -> Self {
        Self {
            round_number: round.round_number,
            seed_id: round.seed_id,
            server_seed_hash: round.server_seed_hash.clone(),
            client_seed: round.client_seed.clone(),
            game_type: round.game_type,
            formula: round.formula(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRoundResponse {
    pub round_number: u64,
    pub outcome: Option<GameOutcome>,
    pub server_seed: Option<String>,
    pub status: RoundStatus,
}

impl From<&Round> for SettleRoundResponse {
    fn from(round: &Round) -> Self {
        Self {
            round_number: round.round_number,
            outcome: round.outcome.clone(),
            server_seed: round.server_seed.clone(),
            status: round.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub accepting_rounds: bool,
    pub version: String,
}
