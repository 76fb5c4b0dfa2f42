//! Engine facade: wires the vault, ledger and verifier together and applies
//! the configured disclosure policy.

use crate::config::{DisclosurePolicy, EngineConfig};
use crate::errors::{EngineError, EngineResult};
use crate::games::{GameParameters, GameType, MapperRegistry};
use crate::ledger::{Round, RoundLedger, RoundStatus};
use crate::metrics::EngineMetrics;
use crate::seed_vault::{
    validate_client_seed, EntropySource, OsEntropy, Seed, SeedId, SeedState, SeedVault,
};
use crate::storage::{MemoryRoundStore, RoundStore};
use crate::verification::{IntegrityAlertSink, Recipe, TracingAlertSink, VerificationResult, VerificationService};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Rotations attempted when the active seed fills up under concurrent load
const MAX_ROTATION_RETRIES: usize = 16;

/// Published commitment of a seed
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeedCommitment {
    pub seed_id: SeedId,
    pub server_seed_hash: String,
    pub client_seed: Option<String>,
    pub rounds_opened: u64,
    pub state: SeedState,
}

impl From<&Seed> for SeedCommitment {
    fn from(seed: &Seed) -> Self {
        Self {
            seed_id: seed.seed_id,
            server_seed_hash: seed.server_seed_hash.clone(),
            client_seed: seed.client_seed.clone(),
            rounds_opened: seed.rounds_opened,
            state: seed.state,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRotation {
    pub retired: Option<SeedCommitment>,
    pub active: SeedCommitment,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeedDisclosure {
    pub seed_id: SeedId,
    pub server_seed: String,
    pub server_seed_hash: String,
}

pub struct FairnessEngine {
    config: EngineConfig,
    vault: Arc<SeedVault>,
    ledger: Arc<RoundLedger>,
    verifier: VerificationService,
    metrics: Arc<EngineMetrics>,
    active_seed: Mutex<Option<SeedId>>,
}

impl FairnessEngine {
    /// Engine with OS entropy and in-memory round storage
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_parts(config, Box::new(OsEntropy), Arc::new(MemoryRoundStore::new()))
    }

    pub fn with_parts(
        config: EngineConfig,
        entropy: Box<dyn EntropySource>,
        store: Arc<dyn RoundStore>,
    ) -> EngineResult<Self> {
        Self::with_alert_sink(config, entropy, store, Arc::new(TracingAlertSink))
    }

    pub fn with_alert_sink(
        config: EngineConfig,
        entropy: Box<dyn EntropySource>,
        store: Arc<dyn RoundStore>,
        alerts: Arc<dyn IntegrityAlertSink>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let rounds_per_seed = match config.seeds.disclosure {
            DisclosurePolicy::PerSeed => Some(config.seeds.rounds_per_seed),
            DisclosurePolicy::PerRound => None,
        };
        let vault = Arc::new(SeedVault::with_entropy(
            entropy,
            config.seeds.default_client_seed.clone(),
            rounds_per_seed,
        ));
        if let Some(last_seed_id) = store.last_seed_id()? {
            vault.resume_after(last_seed_id);
        }
        let mappers = Arc::new(MapperRegistry::from_config(&config));
        let ledger = Arc::new(RoundLedger::new(store, vault.clone(), mappers)?);
        let metrics = Arc::new(EngineMetrics::new());
        let verifier = VerificationService::with_alert_sink(ledger.clone(), metrics.clone(), alerts);

        tracing::info!(
            disclosure = ?config.seeds.disclosure,
            rounds_per_seed = config.seeds.rounds_per_seed,
            "Fairness engine initialized"
        );

        Ok(Self {
            config,
            vault,
            ledger,
            verifier,
            metrics,
            active_seed: Mutex::new(None),
        })
    }

    /// Open a round. The returned round carries the seed hash, never the seed.
    ///
    /// Under per-seed disclosure the round runs on the published active seed.
    /// A client seed that differs from the one an in-use active seed already
    /// serves fails with `SeedAlreadyInUse`; the caller rotates and retries.
    pub fn place_bet(
        &self,
        game_type: GameType,
        params: GameParameters,
        client_seed: Option<&str>,
    ) -> EngineResult<Round> {
        if let Some(value) = client_seed {
            validate_client_seed(value)?;
        }

        let result = match self.config.seeds.disclosure {
            DisclosurePolicy::PerSeed => self.open_on_shared_seed(game_type, params, client_seed),
            DisclosurePolicy::PerRound => self.open_on_fresh_seed(game_type, params, client_seed),
        };

        match &result {
            Ok(_) => self.metrics.record_round_opened(),
            Err(EngineError::InvalidParameters(_)) => self.metrics.record_parameter_rejection(),
            Err(_) => {}
        }
        result
    }

    fn open_on_shared_seed(
        &self,
        game_type: GameType,
        params: GameParameters,
        client_seed: Option<&str>,
    ) -> EngineResult<Round> {
        let mut attempts = 0;
        loop {
            let seed_id = self.current_seed()?;
            match self
                .ledger
                .open_round_for_client(game_type, params, seed_id, client_seed)
            {
                Err(EngineError::SeedRetired { seed_id }) if attempts < MAX_ROTATION_RETRIES => {
                    attempts += 1;
                    tracing::debug!(seed_id, attempts, "Active seed retired; rotating");
                }
                result => return result,
            }
        }
    }

    fn open_on_fresh_seed(
        &self,
        game_type: GameType,
        params: GameParameters,
        client_seed: Option<&str>,
    ) -> EngineResult<Round> {
        self.ledger.mappers().validate(game_type, &params)?;
        let seed = self.commit_seed()?;
        let round = self
            .ledger
            .open_round_for_client(game_type, params, seed.seed_id, client_seed)?;
        self.vault.retire(seed.seed_id)?;
        Ok(round)
    }

    /// Active seed, replaced by a fresh commitment once it is retired
    fn current_seed(&self) -> EngineResult<SeedId> {
        let mut active = self.active_seed.lock();
        if let Some(seed_id) = *active {
            if !self.vault.seed(seed_id)?.retired {
                return Ok(seed_id);
            }
        }
        let previous = *active;
        let fresh = self.commit_seed()?;
        tracing::info!(
            previous = ?previous,
            active = fresh.seed_id,
            server_seed_hash = %fresh.server_seed_hash,
            "Activated server seed"
        );
        *active = Some(fresh.seed_id);
        Ok(fresh.seed_id)
    }

    fn commit_seed(&self) -> EngineResult<Seed> {
        let was_halted = self.vault.is_halted();
        match self.vault.commit_seed() {
            Ok(seed) => {
                self.metrics.record_seed_committed();
                Ok(seed)
            }
            Err(e) => {
                if !was_halted && matches!(e, EngineError::EntropyFailure(_)) {
                    self.metrics.record_entropy_failure();
                }
                Err(e)
            }
        }
    }

    /// Compute and store the outcome. Under per-round disclosure the seed is
    /// revealed immediately afterwards.
    pub fn settle(&self, round_number: u64) -> EngineResult<Round> {
        let was_settled = self.ledger.get_round(round_number)?.is_settled();
        let round = self.ledger.settle_round(round_number)?;
        if !was_settled {
            self.metrics.record_round_settled();
        }

        if self.config.seeds.disclosure == DisclosurePolicy::PerRound
            && round.status == RoundStatus::Committed
        {
            self.reveal_seed(round.seed_id)?;
            return self.ledger.get_round(round_number);
        }
        Ok(round)
    }

    /// Retire the active seed and commit a fresh one.
    pub fn rotate_seed(&self) -> EngineResult<SeedRotation> {
        let mut active = self.active_seed.lock();
        let fresh = self.commit_seed()?;
        let retired = match *active {
            Some(seed_id) => Some(SeedCommitment::from(&self.vault.retire(seed_id)?)),
            None => None,
        };
        *active = Some(fresh.seed_id);

        tracing::info!(
            retired = retired.as_ref().map(|s| s.seed_id),
            active = fresh.seed_id,
            server_seed_hash = %fresh.server_seed_hash,
            "Rotated server seed"
        );
        Ok(SeedRotation {
            retired,
            active: SeedCommitment::from(&fresh),
        })
    }

    /// Disclose a retired seed and attach it to its rounds.
    ///
    /// Refused while any round opened on the seed is still unsettled.
    pub fn reveal_seed(&self, seed_id: SeedId) -> EngineResult<SeedDisclosure> {
        let seed = self.vault.seed(seed_id)?;
        if !seed.retired {
            return Err(EngineError::SeedStillActive { seed_id });
        }

        let recorded = self.ledger.rounds_for_seed(seed_id)?;
        let in_flight = (seed.rounds_opened as usize).saturating_sub(recorded.len());
        let pending = in_flight + recorded.iter().filter(|r| !r.is_settled()).count();
        if pending > 0 {
            return Err(EngineError::UnsettledRounds { seed_id, pending });
        }

        let server_seed = self.vault.reveal_seed(seed_id)?;
        if seed.state == SeedState::Committed {
            self.metrics.record_seed_revealed();
        }
        self.ledger.reveal_rounds_for_seed(seed_id, &server_seed)?;

        Ok(SeedDisclosure {
            seed_id,
            server_seed: server_seed.to_hex(),
            server_seed_hash: seed.server_seed_hash,
        })
    }

    /// Commitment of the active seed, committing one if none exists yet
    pub fn active_seed(&self) -> EngineResult<SeedCommitment> {
        let seed_id = self.current_seed()?;
        Ok(SeedCommitment::from(&self.vault.seed(seed_id)?))
    }

    pub fn seed(&self, seed_id: SeedId) -> EngineResult<Seed> {
        self.vault.seed(seed_id)
    }

    pub fn round(&self, round_number: u64) -> EngineResult<Round> {
        self.ledger.get_round(round_number)
    }

    pub fn verify(&self, round_number: u64) -> EngineResult<VerificationResult> {
        self.verifier.verify(round_number)
    }

    pub fn explain(&self, round_number: u64) -> EngineResult<Recipe> {
        self.verifier.explain(round_number)
    }

    /// False once entropy failure has halted round acceptance
    pub fn is_accepting(&self) -> bool {
        !self.vault.is_halted()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
