//! Round ledger: assigns round numbers, records outcomes once, tracks status.

use crate::errors::{EngineError, EngineResult};
use crate::games::{mapper_for_rules, GameOutcome, GameParameters, GameType, MapperRegistry, OutcomeRules};
use crate::seed_vault::{SeedId, SeedVault, ServerSeed};
use crate::storage::RoundStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Round lifecycle: Committed -> Revealed -> Verified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Committed,
    Revealed,
    Verified,
}

impl RoundStatus {
    pub fn can_transition_to(self, next: RoundStatus) -> bool {
        matches!(
            (self, next),
            (RoundStatus::Committed, RoundStatus::Revealed)
                | (RoundStatus::Revealed, RoundStatus::Verified)
        )
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Committed => write!(f, "committed"),
            RoundStatus::Revealed => write!(f, "revealed"),
            RoundStatus::Verified => write!(f, "verified"),
        }
    }
}

/// Persisted round record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// Also the nonce fed to the byte stream
    pub round_number: u64,
    pub game_type: GameType,
    pub seed_id: SeedId,
    pub game_parameters: GameParameters,
    /// Mapper settings at open; settlement and verification replay these
    pub rules: OutcomeRules,
    pub server_seed_hash: String,
    /// Hex server seed, present once disclosed
    pub server_seed: Option<String>,
    pub client_seed: String,
    pub outcome: Option<GameOutcome>,
    pub bytes_consumed: Option<usize>,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Formula published with this round's commitment
    pub fn formula(&self) -> String {
        mapper_for_rules(&self.rules).formula()
    }

    fn transition(&mut self, next: RoundStatus) -> EngineResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                round_number: self.round_number,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

pub struct RoundLedger {
    store: Arc<dyn RoundStore>,
    vault: Arc<SeedVault>,
    mappers: Arc<MapperRegistry>,
    next_round: AtomicU64,
}

impl RoundLedger {
    /// Build a ledger over `store`, continuing numbering after its last round.
    pub fn new(
        store: Arc<dyn RoundStore>,
        vault: Arc<SeedVault>,
        mappers: Arc<MapperRegistry>,
    ) -> EngineResult<Self> {
        let next = store.last_round_number()?.map_or(1, |n| n + 1);
        tracing::debug!(next_round = next, "Round ledger initialized");
        Ok(Self {
            store,
            vault,
            mappers,
            next_round: AtomicU64::new(next),
        })
    }

    /// Open a round against `seed_id`. Parameters are validated before any
    /// state changes.
    pub fn open_round(
        &self,
        game_type: GameType,
        params: GameParameters,
        seed_id: SeedId,
    ) -> EngineResult<Round> {
        self.open_round_for_client(game_type, params, seed_id, None)
    }

    /// Open a round whose outcome must use `client_seed`. Fails with
    /// `SeedAlreadyInUse` if the seed already serves another client seed.
    pub fn open_round_for_client(
        &self,
        game_type: GameType,
        params: GameParameters,
        seed_id: SeedId,
        client_seed: Option<&str>,
    ) -> EngineResult<Round> {
        self.vault.ensure_accepting()?;
        if let Err(e) = self.mappers.validate(game_type, &params) {
            tracing::warn!(%game_type, error = %e, "Rejected round parameters");
            return Err(e);
        }

        let rules = self.mappers.get(game_type)?.rules();
        let binding = self.vault.reserve_round(seed_id, client_seed)?;
        let round_number = self.next_round.fetch_add(1, Ordering::SeqCst);

        let round = Round {
            round_number,
            game_type,
            seed_id,
            game_parameters: params,
            rules,
            server_seed_hash: binding.server_seed_hash,
            server_seed: None,
            client_seed: binding.client_seed,
            outcome: None,
            bytes_consumed: None,
            status: RoundStatus::Committed,
            created_at: Utc::now(),
            settled_at: None,
        };
        if let Err(e) = self.store.insert(round.clone()) {
            // Round numbers are never reused; only the seed's count is rolled back
            self.vault.release_round(seed_id)?;
            tracing::error!(round_number, seed_id, error = %e, "Failed to record round");
            return Err(e);
        }

        tracing::debug!(round_number, seed_id, %game_type, "Opened round");
        Ok(round)
    }

    /// Compute and record the outcome. Settling twice returns the stored round.
    pub fn settle_round(&self, round_number: u64) -> EngineResult<Round> {
        let round = self.get_round(round_number)?;
        if round.is_settled() {
            return Ok(round);
        }

        let mut stream = self.vault.open_stream(round.seed_id, round.round_number)?;
        let mapped = mapper_for_rules(&round.rules).map(&mut stream, &round.game_parameters)?;
        let disclosed = self.vault.disclosed_seed(round.seed_id)?;

        let settled = self.store.update(round_number, &mut |record| {
            if record.is_settled() {
                return Ok(());
            }
            record.outcome = Some(mapped.outcome.clone());
            record.bytes_consumed = Some(mapped.bytes_consumed);
            record.settled_at = Some(Utc::now());
            if let Some(seed) = &disclosed {
                record.server_seed = Some(seed.to_hex());
                record.transition(RoundStatus::Revealed)?;
            }
            Ok(())
        })?;

        tracing::info!(
            round_number,
            seed_id = settled.seed_id,
            game_type = %settled.game_type,
            status = %settled.status,
            "Settled round"
        );
        Ok(settled)
    }

    pub fn get_round(&self, round_number: u64) -> EngineResult<Round> {
        self.store
            .get(round_number)?
            .ok_or(EngineError::RoundNotFound(round_number))
    }

    pub fn rounds_for_seed(&self, seed_id: SeedId) -> EngineResult<Vec<Round>> {
        self.store.rounds_for_seed(seed_id)
    }

    /// Number of rounds on `seed_id` without an outcome
    pub fn unsettled_count(&self, seed_id: SeedId) -> EngineResult<usize> {
        Ok(self
            .rounds_for_seed(seed_id)?
            .iter()
            .filter(|r| !r.is_settled())
            .count())
    }

    /// Copy a disclosed seed onto its settled rounds and mark them Revealed.
    pub fn reveal_rounds_for_seed(
        &self,
        seed_id: SeedId,
        server_seed: &ServerSeed,
    ) -> EngineResult<Vec<Round>> {
        let seed_hex = server_seed.to_hex();
        let mut revealed = Vec::new();

        for round in self.rounds_for_seed(seed_id)? {
            if round.status != RoundStatus::Committed || !round.is_settled() {
                continue;
            }
            if !server_seed.matches_commitment(&round.server_seed_hash) {
                return Err(EngineError::IntegrityMismatch {
                    round_number: round.round_number,
                    detail: "revealed seed does not match the round's commitment".to_string(),
                });
            }
            let updated = self.store.update(round.round_number, &mut |record| {
                if record.status == RoundStatus::Committed {
                    record.server_seed = Some(seed_hex.clone());
                    record.transition(RoundStatus::Revealed)?;
                }
                Ok(())
            })?;
            revealed.push(updated);
        }

        tracing::info!(seed_id, rounds = revealed.len(), "Revealed rounds for seed");
        Ok(revealed)
    }

    /// Advisory mark after a successful verification. Idempotent.
    pub fn mark_verified(&self, round_number: u64) -> EngineResult<Round> {
        self.store.update(round_number, &mut |record| match record.status {
            RoundStatus::Verified => Ok(()),
            _ => record.transition(RoundStatus::Verified),
        })
    }

    pub fn mappers(&self) -> &MapperRegistry {
        &self.mappers
    }

    pub fn vault(&self) -> &Arc<SeedVault> {
        &self.vault
    }
}
