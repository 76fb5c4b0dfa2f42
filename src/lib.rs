//! Fairness Engine - provably-fair outcomes for casino mini-games
//!
//! A server seed is committed (its SHA-256 published) before any round uses
//! it. Outcomes are derived from an HMAC-SHA256 byte stream keyed by the
//! server seed over `client_seed:round_number:counter`, mapped to game
//! results with integer-only formulas, and recorded exactly once. After the
//! seed is revealed anyone can recompute every round from the record alone.

pub mod api;
pub mod byte_stream;
pub mod config;
pub mod engine;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod seed_vault;
pub mod storage;
pub mod verification;

pub use byte_stream::ByteStream;
pub use config::{ConfigLoader, DisclosurePolicy, EngineConfig};
pub use engine::{FairnessEngine, SeedCommitment, SeedDisclosure, SeedRotation};
pub use errors::{EngineError, EngineResult, ErrorSeverity};
pub use games::{GameOutcome, GameParameters, GameType, Hundredths, MapperRegistry, OutcomeMapper};
pub use ledger::{Round, RoundLedger, RoundStatus};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use seed_vault::{EntropySource, OsEntropy, Seed, SeedId, SeedVault, ServerSeed};
pub use storage::{MemoryRoundStore, RoundStore};
pub use verification::{
    IntegrityAlert, IntegrityAlertSink, IntegrityMismatch, Recipe, TracingAlertSink,
    VerificationResult, VerificationService,
};

#[cfg(feature = "rocksdb")]
pub use storage::RocksRoundStore;
