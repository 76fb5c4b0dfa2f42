//! Independent recomputation of recorded rounds.
//!
//! Verification reads only the round record: the disclosed server seed, the
//! client seed, the round number and the parameters. It never consults the
//! seed vault, so a record that disagrees with its own inputs is caught even
//! if the live engine state was tampered with.

use crate::byte_stream::{ByteStream, BYTE_ORDER, CONSTRUCTION};
use crate::errors::{EngineError, EngineResult, StorageError};
use crate::games::{mapper_for_rules, GameOutcome, GameParameters, GameType, MappedOutcome, OutcomeRules};
use crate::ledger::{Round, RoundLedger};
use crate::metrics::EngineMetrics;
use crate::seed_vault::ServerSeed;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// What a failed verification disagreed on
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityMismatch {
    /// SHA-256 of the disclosed seed is not the published hash
    #[serde(rename_all = "camelCase")]
    Commitment {
        expected_hash: String,
        actual_hash: Option<String>,
    },
    Outcome {
        recorded: GameOutcome,
        recomputed: GameOutcome,
    },
    ByteCount {
        recorded: Option<usize>,
        recomputed: usize,
    },
    /// Recorded game, rules and parameters cannot produce an outcome
    Parameters { detail: String },
}

impl fmt::Display for IntegrityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityMismatch::Commitment { expected_hash, actual_hash } => write!(
                f,
                "seed hash {} does not match commitment {}",
                actual_hash.as_deref().unwrap_or("<undecodable seed>"),
                expected_hash
            ),
            IntegrityMismatch::Outcome { .. } => {
                write!(f, "recorded outcome differs from recomputed outcome")
            }
            IntegrityMismatch::ByteCount { recorded, recomputed } => write!(
                f,
                "recorded {:?} bytes consumed, recomputation used {}",
                recorded, recomputed
            ),
            IntegrityMismatch::Parameters { detail } => {
                write!(f, "recorded round cannot be replayed: {}", detail)
            }
        }
    }
}

/// Everything needed to reproduce an outcome without this crate
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub round_number: u64,
    pub game_type: GameType,
    pub game_parameters: GameParameters,
    pub rules: OutcomeRules,
    pub server_seed_hash: String,
    pub server_seed: Option<String>,
    pub client_seed: String,
    pub construction: String,
    pub byte_order_description: String,
    pub formula: String,
    pub bytes_consumed: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub round_number: u64,
    pub is_valid: bool,
    pub recomputed_outcome: Option<GameOutcome>,
    pub recorded_outcome: GameOutcome,
    pub recipe: Recipe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<IntegrityMismatch>,
}

impl VerificationResult {
    /// Turn an invalid result into an error
    pub fn into_checked(self) -> EngineResult<Self> {
        match &self.mismatch {
            Some(mismatch) => Err(EngineError::IntegrityMismatch {
                round_number: self.round_number,
                detail: mismatch.to_string(),
            }),
            None => Ok(self),
        }
    }
}

/// Raised whenever verification finds a mismatch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityAlert {
    pub round_number: u64,
    pub mismatch: IntegrityMismatch,
    pub detected_at: DateTime<Utc>,
}

/// Destination for integrity alerts
pub trait IntegrityAlertSink: Send + Sync {
    fn raise(&self, alert: &IntegrityAlert);
}

/// Logs alerts on the `fairness_engine::integrity` target
pub struct TracingAlertSink;

impl IntegrityAlertSink for TracingAlertSink {
    fn raise(&self, alert: &IntegrityAlert) {
        tracing::error!(
            target: "fairness_engine::integrity",
            round_number = alert.round_number,
            mismatch = %alert.mismatch,
            "Integrity mismatch detected"
        );
    }
}

pub struct VerificationService {
    ledger: Arc<RoundLedger>,
    metrics: Arc<EngineMetrics>,
    alerts: Arc<dyn IntegrityAlertSink>,
}

impl VerificationService {
    pub fn new(ledger: Arc<RoundLedger>, metrics: Arc<EngineMetrics>) -> Self {
        Self::with_alert_sink(ledger, metrics, Arc::new(TracingAlertSink))
    }

    pub fn with_alert_sink(
        ledger: Arc<RoundLedger>,
        metrics: Arc<EngineMetrics>,
        alerts: Arc<dyn IntegrityAlertSink>,
    ) -> Self {
        Self {
            ledger,
            metrics,
            alerts,
        }
    }

    /// Recompute a round from its record and compare.
    ///
    /// Errors with `SeedNotYetRevealed` before disclosure and
    /// `RoundNotSettled` before an outcome exists. A mismatch is reported
    /// in the result, never corrected.
    pub fn verify(&self, round_number: u64) -> EngineResult<VerificationResult> {
        let round = self.ledger.get_round(round_number)?;
        let Some(seed_hex) = round.server_seed.clone() else {
            return Err(EngineError::SeedNotYetRevealed { round_number });
        };
        let Some(recorded) = round.outcome.clone() else {
            return Err(EngineError::RoundNotSettled(round_number));
        };
        let recipe = Self::recipe(&round);

        let (recomputed, mismatch) = match self
            .check_commitment(&round, &seed_hex)
            .and_then(|server_seed| Self::recompute(&round, &server_seed))
        {
            Err(mismatch) => (None, Some(mismatch)),
            Ok(mapped) => {
                let mismatch = if canonical(&recorded)? != canonical(&mapped.outcome)? {
                    Some(IntegrityMismatch::Outcome {
                        recorded: recorded.clone(),
                        recomputed: mapped.outcome.clone(),
                    })
                } else if round.bytes_consumed != Some(mapped.bytes_consumed) {
                    Some(IntegrityMismatch::ByteCount {
                        recorded: round.bytes_consumed,
                        recomputed: mapped.bytes_consumed,
                    })
                } else {
                    None
                };
                (Some(mapped.outcome), mismatch)
            }
        };

        let is_valid = mismatch.is_none();
        self.metrics.record_verification(is_valid);

        match &mismatch {
            Some(mismatch) => self.alerts.raise(&IntegrityAlert {
                round_number,
                mismatch: mismatch.clone(),
                detected_at: Utc::now(),
            }),
            None => {
                self.ledger.mark_verified(round_number)?;
                tracing::debug!(round_number, "Round verified");
            }
        }

        Ok(VerificationResult {
            round_number,
            is_valid,
            recomputed_outcome: recomputed,
            recorded_outcome: recorded,
            recipe,
            mismatch,
        })
    }

    /// Published recipe for a round; the seed is `None` until disclosed.
    pub fn explain(&self, round_number: u64) -> EngineResult<Recipe> {
        let round = self.ledger.get_round(round_number)?;
        Ok(Self::recipe(&round))
    }

    fn recipe(round: &Round) -> Recipe {
        Recipe {
            round_number: round.round_number,
            game_type: round.game_type,
            game_parameters: round.game_parameters,
            rules: round.rules,
            server_seed_hash: round.server_seed_hash.clone(),
            server_seed: round.server_seed.clone(),
            client_seed: round.client_seed.clone(),
            construction: CONSTRUCTION.to_string(),
            byte_order_description: BYTE_ORDER.to_string(),
            formula: round.formula(),
            bytes_consumed: round.bytes_consumed,
        }
    }

    /// Replay the recorded rules over the recorded inputs
    fn recompute(round: &Round, server_seed: &ServerSeed) -> Result<MappedOutcome, IntegrityMismatch> {
        if round.rules.game_type() != round.game_type
            || round.game_parameters.game_type() != round.game_type
        {
            return Err(IntegrityMismatch::Parameters {
                detail: format!(
                    "{} round records {} rules and {} parameters",
                    round.game_type,
                    round.rules.game_type(),
                    round.game_parameters.game_type()
                ),
            });
        }
        let mut stream = ByteStream::derive(server_seed, &round.client_seed, round.round_number);
        mapper_for_rules(&round.rules)
            .map(&mut stream, &round.game_parameters)
            .map_err(|e| IntegrityMismatch::Parameters {
                detail: e.to_string(),
            })
    }

    fn check_commitment(&self, round: &Round, seed_hex: &str) -> Result<ServerSeed, IntegrityMismatch> {
        let mismatch = |actual_hash| IntegrityMismatch::Commitment {
            expected_hash: round.server_seed_hash.clone(),
            actual_hash,
        };
        let server_seed = ServerSeed::from_hex(seed_hex).map_err(|_| mismatch(None))?;
        if !server_seed.matches_commitment(&round.server_seed_hash) {
            return Err(mismatch(Some(server_seed.commitment())));
        }
        Ok(server_seed)
    }
}

/// Canonical JSON bytes used for outcome comparison
fn canonical(outcome: &GameOutcome) -> EngineResult<Vec<u8>> {
    Ok(serde_json::to_vec(outcome).map_err(StorageError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::games::{DiceDirection, DiceOutcome, DiceParams, Hundredths, MapperRegistry, MinesParams};
    use crate::ledger::RoundStatus;
    use crate::seed_vault::SeedVault;
    use crate::storage::{MemoryRoundStore, RoundStore};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<IntegrityAlert>>,
    }

    impl IntegrityAlertSink for RecordingSink {
        fn raise(&self, alert: &IntegrityAlert) {
            self.alerts.lock().push(alert.clone());
        }
    }

    struct Fixture {
        store: Arc<MemoryRoundStore>,
        vault: Arc<SeedVault>,
        ledger: Arc<RoundLedger>,
        sink: Arc<RecordingSink>,
        metrics: Arc<EngineMetrics>,
        verifier: VerificationService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRoundStore::new());
        let vault = Arc::new(SeedVault::new("default", None));
        let mappers = Arc::new(MapperRegistry::from_config(&EngineConfig::default()));
        let ledger = Arc::new(RoundLedger::new(store.clone(), vault.clone(), mappers).unwrap());
        let sink = Arc::new(RecordingSink::default());
        let metrics = Arc::new(EngineMetrics::new());
        let verifier = VerificationService::with_alert_sink(ledger.clone(), metrics.clone(), sink.clone());
        Fixture {
            store,
            vault,
            ledger,
            sink,
            metrics,
            verifier,
        }
    }

    fn settled_and_revealed(f: &Fixture) -> u64 {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let seed = f.vault.commit_seed_with(ServerSeed::from_bytes(bytes));
        f.vault.bind_client_seed(seed.seed_id, Some("abc")).unwrap();
        let params = GameParameters::Dice(DiceParams {
            target: Hundredths(5000),
            direction: DiceDirection::Over,
        });
        let round = f.ledger.open_round(GameType::Dice, params, seed.seed_id).unwrap();
        f.ledger.settle_round(round.round_number).unwrap();
        f.vault.retire(seed.seed_id).unwrap();
        let server_seed = f.vault.reveal_seed(seed.seed_id).unwrap();
        f.ledger.reveal_rounds_for_seed(seed.seed_id, &server_seed).unwrap();
        round.round_number
    }

    #[test]
    fn test_verify_before_reveal_is_not_invalid() {
        let f = fixture();
        let seed = f.vault.commit_seed().unwrap();
        let params = GameParameters::Dice(DiceParams {
            target: Hundredths(5000),
            direction: DiceDirection::Under,
        });
        let round = f.ledger.open_round(GameType::Dice, params, seed.seed_id).unwrap();
        f.ledger.settle_round(round.round_number).unwrap();

        assert!(matches!(
            f.verifier.verify(round.round_number),
            Err(EngineError::SeedNotYetRevealed { .. })
        ));
        let recipe = f.verifier.explain(round.round_number).unwrap();
        assert!(recipe.server_seed.is_none());
        assert_eq!(recipe.server_seed_hash, seed.server_seed_hash);
    }

    #[test]
    fn test_valid_round_is_marked_verified() {
        let f = fixture();
        let round_number = settled_and_revealed(&f);
        let result = f.verifier.verify(round_number).unwrap();
        assert!(result.is_valid);
        assert_eq!(
            result.recomputed_outcome,
            Some(GameOutcome::Dice(DiceOutcome {
                roll: Hundredths(3206),
                won: false
            }))
        );
        assert_eq!(result.recipe.bytes_consumed, Some(4));
        assert!(result.into_checked().is_ok());
        assert_eq!(f.ledger.get_round(round_number).unwrap().status, RoundStatus::Verified);

        let again = f.verifier.verify(round_number).unwrap();
        assert!(again.is_valid);
        assert!(f.sink.alerts.lock().is_empty());
    }

    #[test]
    fn test_tampered_outcome_is_flagged() {
        let f = fixture();
        let round_number = settled_and_revealed(&f);
        f.store
            .update(round_number, &mut |r| {
                r.outcome = Some(GameOutcome::Dice(DiceOutcome {
                    roll: Hundredths(9999),
                    won: true,
                }));
                Ok(())
            })
            .unwrap();

        let result = f.verifier.verify(round_number).unwrap();
        assert!(!result.is_valid);
        assert!(matches!(result.mismatch, Some(IntegrityMismatch::Outcome { .. })));
        assert_eq!(f.sink.alerts.lock().len(), 1);
        assert_eq!(f.ledger.get_round(round_number).unwrap().status, RoundStatus::Revealed);
        assert!(matches!(
            result.into_checked(),
            Err(EngineError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_unreplayable_parameters_are_an_integrity_fault() {
        let f = fixture();
        let round_number = settled_and_revealed(&f);
        f.store
            .update(round_number, &mut |r| {
                r.game_type = GameType::Mines;
                r.rules = OutcomeRules::Mines;
                r.game_parameters = GameParameters::Mines(MinesParams { mines_count: 25 });
                Ok(())
            })
            .unwrap();

        let result = f.verifier.verify(round_number).unwrap();
        assert!(!result.is_valid);
        assert!(result.recomputed_outcome.is_none());
        match &result.mismatch {
            Some(IntegrityMismatch::Parameters { detail }) => assert!(detail.contains("25")),
            other => panic!("expected a parameters mismatch, got {:?}", other),
        }
        assert_eq!(f.sink.alerts.lock().len(), 1);
        assert_eq!(f.metrics.snapshot().integrity_mismatches, 1);
        assert!(matches!(
            result.into_checked(),
            Err(EngineError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_parameters_for_another_game_are_flagged() {
        let f = fixture();
        let round_number = settled_and_revealed(&f);
        f.store
            .update(round_number, &mut |r| {
                r.game_parameters = GameParameters::Mines(MinesParams { mines_count: 3 });
                Ok(())
            })
            .unwrap();

        let result = f.verifier.verify(round_number).unwrap();
        assert!(matches!(result.mismatch, Some(IntegrityMismatch::Parameters { .. })));
        assert_eq!(f.sink.alerts.lock().len(), 1);
    }

    #[test]
    fn test_substituted_seed_fails_commitment() {
        let f = fixture();
        let round_number = settled_and_revealed(&f);
        f.store
            .update(round_number, &mut |r| {
                r.server_seed = Some("11".repeat(32));
                Ok(())
            })
            .unwrap();

        let result = f.verifier.verify(round_number).unwrap();
        assert!(!result.is_valid);
        assert!(result.recomputed_outcome.is_none());
        assert!(matches!(result.mismatch, Some(IntegrityMismatch::Commitment { .. })));
    }

    #[test]
    fn test_byte_count_tamper_is_flagged() {
        let f = fixture();
        let round_number = settled_and_revealed(&f);
        f.store
            .update(round_number, &mut |r| {
                r.bytes_consumed = Some(8);
                Ok(())
            })
            .unwrap();

        let result = f.verifier.verify(round_number).unwrap();
        assert!(matches!(
            result.mismatch,
            Some(IntegrityMismatch::ByteCount {
                recorded: Some(8),
                recomputed: 4
            })
        ));
    }
}
