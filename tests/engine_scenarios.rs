//! End-to-end round lifecycle through the engine facade

use fairness_engine::{
    config::CrashConfig,
    games::{
        CoinChoice, CoinFlipOutcome, CoinFlipParams, CrashOutcome, CrashParams, DiceDirection,
        DiceOutcome, DiceParams, MinesOutcome, MinesParams,
    },
    DisclosurePolicy, EngineConfig, EngineError, EntropySource, FairnessEngine, GameOutcome,
    GameParameters, GameType, Hundredths, IntegrityMismatch, MemoryRoundStore, RoundStatus,
    RoundStore,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Always yields the fixture seed 0x00..01
struct FixtureEntropy;

impl EntropySource for FixtureEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), String> {
        dest.fill(0);
        if let Some(last) = dest.last_mut() {
            *last = 1;
        }
        Ok(())
    }
}

struct BrokenEntropy;

impl EntropySource for BrokenEntropy {
    fn fill(&self, _dest: &mut [u8]) -> Result<(), String> {
        Err("getrandom: device not configured".to_string())
    }
}

const FIXTURE_HASH: &str = "ec4916dd28fc4c10d78e287ca5d9cc51ee1ae73cbfde08c6b37324cbfaac8bc5";

fn fixture_engine(config: EngineConfig) -> (FairnessEngine, Arc<MemoryRoundStore>) {
    let store = Arc::new(MemoryRoundStore::new());
    let engine = FairnessEngine::with_parts(config, Box::new(FixtureEntropy), store.clone())
        .expect("engine should build");
    (engine, store)
}

fn dice(target: u64, direction: DiceDirection) -> GameParameters {
    GameParameters::Dice(DiceParams {
        target: Hundredths(target),
        direction,
    })
}

#[test]
fn test_dice_fixture_round() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let round = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), Some("abc"))
        .unwrap();
    assert_eq!(round.round_number, 1);
    assert_eq!(round.server_seed_hash, FIXTURE_HASH);

    let settled = engine.settle(round.round_number).unwrap();
    assert_eq!(
        settled.outcome,
        Some(GameOutcome::Dice(DiceOutcome {
            roll: Hundredths(3206),
            won: false,
        }))
    );
}

#[test]
fn test_verify_before_reveal_reports_not_revealed() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let round = engine
        .place_bet(GameType::Crash, GameParameters::Crash(CrashParams::default()), Some("abc"))
        .unwrap();
    let settled = engine.settle(round.round_number).unwrap();
    assert_eq!(
        settled.outcome,
        Some(GameOutcome::Crash(CrashOutcome {
            crash_point: Hundredths(116),
            instant_crash: false,
            cashed_out: None,
        }))
    );

    match engine.verify(round.round_number) {
        Err(EngineError::SeedNotYetRevealed { round_number }) => {
            assert_eq!(round_number, round.round_number)
        }
        other => panic!("expected SeedNotYetRevealed, got {:?}", other.map(|r| r.is_valid)),
    }

    engine.rotate_seed().unwrap();
    let disclosure = engine.reveal_seed(round.seed_id).unwrap();
    assert_eq!(disclosure.server_seed, format!("{}01", "00".repeat(31)));

    let result = engine.verify(round.round_number).unwrap();
    assert!(result.is_valid);
    assert_eq!(result.recipe.server_seed.as_deref(), Some(disclosure.server_seed.as_str()));
    assert_eq!(result.recipe.client_seed, "abc");
}

#[test]
fn test_verification_survives_config_change_across_restart() {
    let store = Arc::new(MemoryRoundStore::new());
    let crash = || GameParameters::Crash(CrashParams::default());
    let round = {
        let engine =
            FairnessEngine::with_parts(EngineConfig::default(), Box::new(FixtureEntropy), store.clone())
                .unwrap();
        let first = engine.place_bet(GameType::Crash, crash(), Some("abc")).unwrap();
        let second = engine.place_bet(GameType::Crash, crash(), Some("abc")).unwrap();
        engine.settle(first.round_number).unwrap();
        engine.settle(second.round_number).unwrap();
        engine.rotate_seed().unwrap();
        engine.reveal_seed(second.seed_id).unwrap();
        second
    };

    let mut capped = EngineConfig::default();
    capped.crash = CrashConfig {
        max_multiplier: Hundredths(1_000),
        instant_crash_modulus: 0,
        ..CrashConfig::default()
    };
    let restarted =
        FairnessEngine::with_parts(capped, Box::new(FixtureEntropy), store.clone()).unwrap();

    let result = restarted.verify(round.round_number).unwrap();
    assert!(result.is_valid, "unexpected mismatch {:?}", result.mismatch);
    assert_eq!(
        result.recomputed_outcome,
        Some(GameOutcome::Crash(CrashOutcome {
            crash_point: Hundredths(4232),
            instant_crash: false,
            cashed_out: None,
        }))
    );
    assert!(result.recipe.formula.contains("h mod 33 = 0"));
    assert!(result.recipe.formula.contains("1000000.00x"));
    assert_eq!(restarted.metrics().snapshot().integrity_mismatches, 0);

    let later = restarted.place_bet(GameType::Crash, crash(), Some("abc")).unwrap();
    assert_eq!(later.round_number, 3);
    let formula = restarted.explain(later.round_number).unwrap().formula;
    assert!(formula.contains("[1.00x, 10.00x]"));
    assert!(!formula.contains("mod 33"));
}

#[test]
fn test_new_client_seed_is_refused_on_used_seed() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let published = engine.active_seed().unwrap();
    engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), Some("alpha"))
        .unwrap();

    assert!(matches!(
        engine.place_bet(GameType::Dice, dice(5000, DiceDirection::Over), Some("beta")),
        Err(EngineError::SeedAlreadyInUse { seed_id }) if seed_id == published.seed_id
    ));

    let rotation = engine.rotate_seed().unwrap();
    let round = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), Some("beta"))
        .unwrap();
    assert_eq!(round.seed_id, rotation.active.seed_id);
    assert_eq!(round.client_seed, "beta");
}

#[test]
fn test_tampered_outcome_fails_verification() {
    let (engine, store) = fixture_engine(EngineConfig::default());
    let round = engine
        .place_bet(
            GameType::Mines,
            GameParameters::Mines(MinesParams { mines_count: 3 }),
            Some("abc"),
        )
        .unwrap();
    let settled = engine.settle(round.round_number).unwrap();
    assert_eq!(
        settled.outcome,
        Some(GameOutcome::Mines(MinesOutcome {
            mine_positions: vec![1, 5, 7]
        }))
    );

    engine.rotate_seed().unwrap();
    engine.reveal_seed(round.seed_id).unwrap();

    store
        .update(round.round_number, &mut |r| {
            r.outcome = Some(GameOutcome::Mines(MinesOutcome {
                mine_positions: vec![1, 5, 8],
            }));
            Ok(())
        })
        .unwrap();

    let result = engine.verify(round.round_number).unwrap();
    assert!(!result.is_valid);
    assert!(matches!(result.mismatch, Some(IntegrityMismatch::Outcome { .. })));
    assert_eq!(
        result.recomputed_outcome,
        Some(GameOutcome::Mines(MinesOutcome {
            mine_positions: vec![1, 5, 7]
        }))
    );
    assert_eq!(engine.metrics().snapshot().integrity_mismatches, 1);
    assert_eq!(engine.round(round.round_number).unwrap().status, RoundStatus::Revealed);
}

#[test]
fn test_concurrent_rounds_get_distinct_numbers() {
    for rounds_per_seed in [10_000, 7] {
        let mut config = EngineConfig::default();
        config.seeds.rounds_per_seed = rounds_per_seed;
        let engine = Arc::new(FairnessEngine::new(config).unwrap());

        let mut numbers: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let engine = engine.clone();
                    scope.spawn(move || {
                        (0..125)
                            .map(|_| {
                                engine
                                    .place_bet(GameType::Dice, dice(5000, DiceDirection::Under), None)
                                    .unwrap()
                                    .round_number
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let unique: HashSet<u64> = numbers.iter().copied().collect();
        assert_eq!(unique.len(), 1_000);
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=1_000).collect::<Vec<u64>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rounds_from_async_tasks() {
    let engine = Arc::new(FairnessEngine::new(EngineConfig::default()).unwrap());
    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .place_bet(
                        GameType::CoinFlip,
                        GameParameters::CoinFlip(CoinFlipParams {
                            choice: CoinChoice::Tails,
                        }),
                        None,
                    )
                    .map(|r| r.round_number)
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        numbers.push(task.await.unwrap().unwrap());
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=100).collect::<Vec<u64>>());
}

#[test]
fn test_sequence_of_games_on_one_seed() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let first = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), Some("abc"))
        .unwrap();
    let second = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), Some("abc"))
        .unwrap();
    let third = engine
        .place_bet(
            GameType::Crash,
            GameParameters::Crash(CrashParams {
                auto_cashout: Some(Hundredths(200)),
            }),
            Some("abc"),
        )
        .unwrap();
    assert_eq!(first.seed_id, third.seed_id);

    assert_eq!(
        engine.settle(second.round_number).unwrap().outcome,
        Some(GameOutcome::Dice(DiceOutcome {
            roll: Hundredths(7091),
            won: true,
        }))
    );
    assert_eq!(
        engine.settle(third.round_number).unwrap().outcome,
        Some(GameOutcome::Crash(CrashOutcome {
            crash_point: Hundredths(224),
            instant_crash: false,
            cashed_out: Some(true),
        }))
    );

    // Settlement order does not change outcomes
    assert_eq!(
        engine.settle(first.round_number).unwrap().outcome,
        Some(GameOutcome::Dice(DiceOutcome {
            roll: Hundredths(3206),
            won: false,
        }))
    );
}

#[test]
fn test_instant_crash_round() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let rounds: Vec<_> = (0..23)
        .map(|_| {
            engine
                .place_bet(GameType::Crash, GameParameters::Crash(CrashParams::default()), Some("abc"))
                .unwrap()
        })
        .collect();
    let last = rounds.last().unwrap();
    assert_eq!(last.round_number, 23);

    let settled = engine.settle(last.round_number).unwrap();
    assert_eq!(
        settled.outcome,
        Some(GameOutcome::Crash(CrashOutcome {
            crash_point: Hundredths(100),
            instant_crash: true,
            cashed_out: None,
        }))
    );
}

#[test]
fn test_default_client_seed_is_bound() {
    let mut config = EngineConfig::default();
    config.seeds.default_client_seed = "default".to_string();
    let (engine, _) = fixture_engine(config);

    let round = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), None)
        .unwrap();
    assert_eq!(round.client_seed, "default");
    let settled = engine.settle(round.round_number).unwrap();
    assert_eq!(
        settled.outcome,
        Some(GameOutcome::Dice(DiceOutcome {
            roll: Hundredths(9310),
            won: true,
        }))
    );
}

#[test]
fn test_outcomes_reproduce_across_engines() {
    let outcomes = || {
        let (engine, _) = fixture_engine(EngineConfig::default());
        (0..20)
            .map(|i| {
                let params = GameParameters::Mines(MinesParams {
                    mines_count: (i % 24 + 1) as u8,
                });
                let round = engine.place_bet(GameType::Mines, params, Some("abc")).unwrap();
                engine.settle(round.round_number).unwrap().outcome
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(outcomes(), outcomes());
}

#[test]
fn test_seed_stays_hidden_until_reveal() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let active = engine.active_seed().unwrap();
    assert_eq!(active.server_seed_hash, FIXTURE_HASH);

    let round = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), None)
        .unwrap();
    assert_eq!(round.seed_id, active.seed_id);
    assert!(round.server_seed.is_none());

    let settled = engine.settle(round.round_number).unwrap();
    assert!(settled.server_seed.is_none());
    assert!(engine.seed(round.seed_id).unwrap().server_seed.is_none());
    assert!(engine.explain(round.round_number).unwrap().server_seed.is_none());

    assert!(matches!(
        engine.reveal_seed(round.seed_id),
        Err(EngineError::SeedStillActive { .. })
    ));
}

#[test]
fn test_entropy_failure_halts_round_acceptance() {
    let engine = FairnessEngine::with_parts(
        EngineConfig::default(),
        Box::new(BrokenEntropy),
        Arc::new(MemoryRoundStore::new()),
    )
    .unwrap();
    assert!(engine.is_accepting());

    for _ in 0..2 {
        let err = engine
            .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::EntropyFailure(_)));
    }
    assert!(!engine.is_accepting());
    assert!(engine.rotate_seed().is_err());

    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.entropy_failures, 1);
    assert_eq!(snapshot.rounds_opened, 0);
}

#[test]
fn test_per_round_disclosure_verifies_after_settle() {
    let mut config = EngineConfig::default();
    config.seeds.disclosure = DisclosurePolicy::PerRound;
    let (engine, _) = fixture_engine(config);

    let round = engine
        .place_bet(
            GameType::CoinFlip,
            GameParameters::CoinFlip(CoinFlipParams {
                choice: CoinChoice::Heads,
            }),
            Some("abc"),
        )
        .unwrap();
    let settled = engine.settle(round.round_number).unwrap();
    assert_eq!(settled.status, RoundStatus::Revealed);
    assert_eq!(
        settled.outcome,
        Some(GameOutcome::CoinFlip(CoinFlipOutcome {
            result: CoinChoice::Tails,
            won: false,
        }))
    );

    let result = engine.verify(round.round_number).unwrap();
    assert!(result.is_valid);
    assert!(result.into_checked().is_ok());
}

#[test]
fn test_invalid_parameters_rejected_without_state_change() {
    let (engine, _) = fixture_engine(EngineConfig::default());
    let too_generous = dice(100, DiceDirection::Over);
    assert!(matches!(
        engine.place_bet(GameType::Dice, too_generous, None),
        Err(EngineError::InvalidParameters(_))
    ));
    assert!(matches!(
        engine.place_bet(
            GameType::Dice,
            GameParameters::Mines(MinesParams { mines_count: 3 }),
            None
        ),
        Err(EngineError::InvalidParameters(_))
    ));

    let round = engine
        .place_bet(GameType::Dice, dice(5000, DiceDirection::Over), None)
        .unwrap();
    assert_eq!(round.round_number, 1);
    assert_eq!(engine.metrics().snapshot().parameter_rejections, 2);
}
